use ignis_core::{
    App, ExtensionError, ExtensionFn, ExtensionModule, ExtensionRegistry, Initializer,
    MapEnv, Registration,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn app_on(registry: &Arc<ExtensionRegistry>) -> App {
    App::builder()
        .registry(Arc::clone(registry))
        .env(MapEnv::new())
        .build()
}

fn spy_extension() -> (Arc<AtomicUsize>, ExtensionFn) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let extension = ExtensionFn::new(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (calls, extension)
}

#[test]
fn registering_the_same_extension_twice_invokes_it_once() {
    let registry = Arc::new(ExtensionRegistry::new());
    let (calls, extension) = spy_extension();

    registry
        .register_extension(extension.clone(), &[])
        .expect("first registration");
    let again = registry
        .register_extension(extension, &[])
        .expect("second registration");

    assert_eq!(again, Registration::AlreadyAttached);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn module_wrapper_is_unwrapped_to_its_default() {
    let registry = Arc::new(ExtensionRegistry::new());
    let (calls, extension) = spy_extension();
    let mut module = ExtensionModule::with_default(extension);
    module
        .exports
        .insert("version".to_string(), json!("1.0.0"));

    registry
        .register_extension(module, &[])
        .expect("module registration");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn instance_use_proxies_to_registry_and_applies_initializers() {
    let registry = Arc::new(ExtensionRegistry::new());
    let mut app = app_on(&registry);
    let seen_registry = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&seen_registry);
    let target = Arc::clone(&registry);

    let extension = ExtensionFn::new(move |attached_to, _| {
        *flag.lock().unwrap() = std::ptr::eq(attached_to, target.as_ref());
        attached_to.register_initializer(Initializer::new(|app| {
            app.insert_extension_state(String::from("installed"));
        }));
    });

    app.use_extension(extension.clone(), &[]).expect("use");
    assert!(*seen_registry.lock().unwrap());
    assert!(registry.is_attached(&extension));
    assert_eq!(
        app.extension_state::<String>().map(String::as_str),
        Some("installed")
    );

    // Instances created later pick up the same initializer.
    let later = app_on(&registry);
    assert!(later.extension_state::<String>().is_some());
}

#[test]
fn peer_modules_load_by_name() {
    let registry = Arc::new(ExtensionRegistry::new());
    let mut app = app_on(&registry);

    assert_eq!(
        app.use_extension("no-op", &[]).expect("no-op loads"),
        Registration::Attached
    );

    let err = app
        .use_extension("ignis-missing", &[])
        .expect_err("unknown module");
    assert_eq!(
        err,
        ExtensionError::ModuleNotFound("ignis-missing".to_string())
    );
}

#[test]
fn forwards_arguments_to_the_extension_function() {
    let registry = Arc::new(ExtensionRegistry::new());
    let received = Arc::new(Mutex::new(Vec::<Value>::new()));
    let sink = Arc::clone(&received);
    let extension = ExtensionFn::new(move |_, args| {
        sink.lock().unwrap().extend(args.iter().cloned());
    });

    registry
        .register_extension(extension, &[json!("test")])
        .expect("registration with argument");
    assert_eq!(*received.lock().unwrap(), vec![json!("test")]);
}

#[test]
fn module_without_default_fails_fast() {
    let registry = Arc::new(ExtensionRegistry::new());
    let mut app = app_on(&registry);

    let err = app
        .use_extension(ExtensionModule::default(), &[])
        .expect_err("no callable default");
    assert!(matches!(err, ExtensionError::InvalidArgument(_)));
}
