use ignis_core::config;
use ignis_core::{
    App, AppEvent, ConfigError, ConfigEventKind, ConfigExt, ConfigStore, ExtensionRegistry,
    MapEnv, MissingEnvEvent, Registration,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn mounted(env: MapEnv) -> App {
    let mut app = App::builder()
        .registry(Arc::new(ExtensionRegistry::new()))
        .env(env)
        .build();
    app.use_extension(config::extension(), &[])
        .expect("config extension attaches");
    app
}

fn record_events(app: &mut App) -> Arc<Mutex<Vec<AppEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    app.subscribe("config.*", move |event| {
        sink.lock().unwrap().push(event.clone());
    });
    events
}

fn topics(events: &Mutex<Vec<AppEvent>>) -> Vec<String> {
    events
        .lock()
        .unwrap()
        .iter()
        .map(|event| event.topic().to_string())
        .collect()
}

#[test]
fn extension_mounts_a_store_on_every_instance() {
    let registry = Arc::new(ExtensionRegistry::new());
    let mut first = App::builder()
        .registry(Arc::clone(&registry))
        .env(MapEnv::new())
        .build();
    assert_eq!(first.config("foo"), Err(ConfigError::NotMounted));

    assert_eq!(
        first.use_extension("config", &[]).expect("named config module"),
        Registration::Attached
    );
    assert!(first.extension_state::<ConfigStore>().is_some());

    let second = App::builder()
        .registry(registry)
        .env(MapEnv::new())
        .build();
    assert!(second.extension_state::<ConfigStore>().is_some());
}

#[test]
fn gets_and_sets_values() {
    let mut app = mounted(MapEnv::new());
    app.set_config("foo", "bar").expect("set");
    assert_eq!(app.config("foo").expect("get"), json!("bar"));
}

#[test]
fn supports_deep_paths() {
    let mut app = mounted(MapEnv::new());
    app.set_config("a.b.c.bar", "foo").expect("deep set");
    assert_eq!(
        app.config("a").expect("get"),
        json!({ "b": { "c": { "bar": "foo" } } })
    );
    assert!(app.has_config("a.b.c"));
}

#[test]
fn undefined_option_error_names_the_path() {
    let app = mounted(MapEnv::new());
    let err = app.config("foo").expect_err("nothing stored");
    assert_eq!(err.to_string(), "Config option 'foo' is not defined.");
}

#[test]
fn emits_set_then_modified() {
    let mut app = mounted(MapEnv::new());
    let events = record_events(&mut app);

    app.set_config("foo", "bar").expect("first write");
    assert_eq!(topics(&events), vec!["config.set"]);

    app.set_config("foo", "test").expect("second write");
    assert_eq!(topics(&events), vec!["config.set", "config.modified"]);

    match &events.lock().unwrap()[1] {
        AppEvent::Config(change) => {
            assert_eq!(change.kind, ConfigEventKind::Modified);
            assert_eq!(change.key, "foo");
            assert_eq!(change.value, json!("test"));
        }
        other => panic!("unexpected event: {other:?}"),
    };
}

#[test]
fn substitutes_environment_variables() {
    let mut app = mounted(MapEnv::new().with("NODE_ENV", "production"));
    app.set_config("foo", json!({ "test": "$NODE_ENV" }))
        .expect("substituted write");
    assert_eq!(app.config("foo.test").expect("get"), json!("production"));

    app.set_config("mode", "$NODE_ENV").expect("scalar write");
    assert_eq!(app.config("mode").expect("get"), json!("production"));
}

#[test]
fn any_name_after_the_sigil_is_looked_up() {
    let mut app = mounted(MapEnv::new().with("DB-HOST", "db.local"));
    app.set_config("h", "$DB-HOST").expect("present variable");
    assert_eq!(app.config("h").expect("get"), json!("db.local"));

    let mut bare = mounted(MapEnv::new());
    let err = bare
        .set_config("h", "$DB-HOST")
        .expect_err("absent variable");
    assert_eq!(err, ConfigError::MissingEnvar("DB-HOST".to_string()));
    assert!(!bare.has_config("h"));
}

#[test]
fn missing_envar_fails_without_events() {
    let mut app = mounted(MapEnv::new());
    let events = record_events(&mut app);

    let err = app
        .set_config("foo", json!({ "test": "$NO_SUCH_VAR" }))
        .expect_err("missing envar");
    assert_eq!(err.to_string(), "Missing envar: NO_SUCH_VAR");
    assert!(events.lock().unwrap().is_empty());
    assert!(!app.has_config("foo"));
}

#[test]
fn import_environment_reports_missing_variables() {
    let mut app = mounted(MapEnv::new());
    let events = record_events(&mut app);

    app.import_environment([("API_KEY", "secret key")])
        .expect("import never fails on missing vars");

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0],
        AppEvent::MissingEnv(MissingEnvEvent {
            name: "API_KEY".to_string(),
            description: "secret key".to_string(),
        })
    );
    assert!(!app.has_config("env.API_KEY"));
}

#[test]
fn import_environment_stores_present_variables_literally() {
    let mut app = mounted(
        MapEnv::new()
            .with("API_KEY", "xyz")
            .with("ALIAS", "$API_KEY"),
    );
    let events = record_events(&mut app);

    app.import_environment([("API_KEY", "secret key"), ("ALIAS", "raw value")])
        .expect("import");

    assert_eq!(app.config("env.API_KEY").expect("get"), json!("xyz"));
    assert_eq!(app.config("env.ALIAS").expect("get"), json!("$API_KEY"));
    assert_eq!(topics(&events), vec!["config.set", "config.set"]);
}

#[test]
fn structural_conflicts_are_reported() {
    let mut app = mounted(MapEnv::new().with("HOME", "/home/ignis"));
    app.set_config("env", "flat").expect("scalar at env");

    let err = app
        .import_environment([("HOME", "home dir")])
        .expect_err("env is not a mapping");
    assert!(matches!(err, ConfigError::PathConflict { .. }));
    assert_eq!(app.config("env").expect("unchanged"), json!("flat"));
}
