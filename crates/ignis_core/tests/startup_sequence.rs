use ignis_core::startup::BindCallback;
use ignis_core::{
    App, ExtensionRegistry, Listener, MapEnv, StartupError, StartupState, TcpRoot,
};
use std::io;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FAILING_PORT: u16 = 1111;

/// Records requested ports; refuses `FAILING_PORT`.
#[derive(Default)]
struct RecordingRoot {
    ports: Mutex<Vec<u16>>,
}

impl Listener for RecordingRoot {
    fn listen(&self, port: u16, done: BindCallback) {
        self.ports.lock().unwrap().push(port);
        if port == FAILING_PORT {
            done(Err(io::Error::new(io::ErrorKind::AddrInUse, "fail")));
        } else {
            done(Ok(()));
        }
    }
}

fn app_with(env: MapEnv, root: Arc<RecordingRoot>) -> App {
    App::builder()
        .registry(Arc::new(ExtensionRegistry::new()))
        .env(env)
        .root(root)
        .build()
}

#[tokio::test]
async fn waits_on_asynchronous_actions_in_order() {
    let root = Arc::new(RecordingRoot::default());
    let mut app = app_with(MapEnv::new(), root);
    let first_done = Arc::new(AtomicBool::new(false));
    let second_done = Arc::new(AtomicBool::new(false));
    let order = Arc::new(Mutex::new(Vec::new()));

    {
        let first_done = Arc::clone(&first_done);
        let order = Arc::clone(&order);
        app.wait(move |_| async move {
            order.lock().unwrap().push("a1");
            tokio::time::sleep(Duration::from_millis(20)).await;
            first_done.store(true, Ordering::SeqCst);
            Ok::<_, StartupError>(())
        });
    }
    {
        let first_done = Arc::clone(&first_done);
        let second_done = Arc::clone(&second_done);
        let order = Arc::clone(&order);
        app.wait(move |_| async move {
            assert!(first_done.load(Ordering::SeqCst));
            order.lock().unwrap().push("a2");
            tokio::time::sleep(Duration::from_millis(30)).await;
            second_done.store(true, Ordering::SeqCst);
            Ok::<_, StartupError>(())
        });
    }
    {
        let second_done = Arc::clone(&second_done);
        let order = Arc::clone(&order);
        app.wait_sync(move |_| {
            assert!(second_done.load(Ordering::SeqCst));
            order.lock().unwrap().push("a3");
            Ok(())
        });
    }

    app.startup().await.expect("startup succeeds");
    assert_eq!(*order.lock().unwrap(), vec!["a1", "a2", "a3"]);
    assert_eq!(app.startup_state(), StartupState::Resolved);
}

#[test]
fn ten_thousand_steps_complete() {
    let root = Arc::new(RecordingRoot::default());
    let mut app = app_with(MapEnv::new(), root);
    let runs = Arc::new(AtomicUsize::new(0));
    for _ in 0..10_000 {
        let runs = Arc::clone(&runs);
        app.wait_sync(move |_| {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    futures::executor::block_on(app.startup()).expect("long chain succeeds");
    assert_eq!(runs.load(Ordering::SeqCst), 10_000);
    assert_eq!(app.startup_state(), StartupState::Resolved);
}

#[test]
fn unpolled_long_chain_can_be_dropped() {
    let root = Arc::new(RecordingRoot::default());
    let mut app = app_with(MapEnv::new(), Arc::clone(&root));
    for _ in 0..10_000 {
        app.wait(|_| async { Ok::<_, StartupError>(()) });
    }
    let pending = app.listen(Some(8080));
    assert_eq!(
        app.startup_state(),
        StartupState::Pending {
            step: 1,
            queued: 10_001
        }
    );

    drop(pending);
    drop(app);
    assert!(root.ports.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_action_prevents_later_actions() {
    let root = Arc::new(RecordingRoot::default());
    let mut app = app_with(MapEnv::new(), Arc::clone(&root));
    let later_ran = Arc::new(AtomicBool::new(false));

    app.wait(|_| async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Err::<(), _>(StartupError::msg("database unreachable"))
    });
    {
        let later_ran = Arc::clone(&later_ran);
        app.wait_sync(move |_| {
            later_ran.store(true, Ordering::SeqCst);
            Ok(())
        });
    }

    let err = app.listen(Some(8080)).await.expect_err("chain fails");
    assert_eq!(err.to_string(), "database unreachable");
    assert!(!later_ran.load(Ordering::SeqCst));
    assert!(root.ports.lock().unwrap().is_empty());
    assert_eq!(app.startup_state(), StartupState::Failed);
}

#[tokio::test]
async fn explicit_port_wins_over_environment() {
    let root = Arc::new(RecordingRoot::default());
    let mut app = app_with(MapEnv::new().with("PORT", "9999"), Arc::clone(&root));

    app.listen(Some(123)).await.expect("bind succeeds");
    assert_eq!(*root.ports.lock().unwrap(), vec![123]);
}

#[tokio::test]
async fn port_defaults_to_environment() {
    let root = Arc::new(RecordingRoot::default());
    let mut app = app_with(MapEnv::new().with("PORT", "9999"), Arc::clone(&root));

    app.listen(None).await.expect("bind succeeds");
    assert_eq!(*root.ports.lock().unwrap(), vec![9999]);
}

#[tokio::test]
async fn bind_failure_rejects_the_startup_future() {
    let root = Arc::new(RecordingRoot::default());
    let mut app = app_with(MapEnv::new().with("PORT", "9999"), root);

    let err = app
        .listen(Some(FAILING_PORT))
        .await
        .expect_err("bind reports failure");
    match err {
        StartupError::Bind { port, source } => {
            assert_eq!(port, FAILING_PORT);
            assert_eq!(source.to_string(), "fail");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn missing_port_fails_at_the_bind_step() {
    let root = Arc::new(RecordingRoot::default());
    let mut app = app_with(MapEnv::new(), Arc::clone(&root));

    let err = app.listen(None).await.expect_err("no port available");
    assert!(matches!(err, StartupError::MissingPort));
    assert!(root.ports.lock().unwrap().is_empty());
}

#[tokio::test]
async fn actions_receive_the_root_handle() {
    let root = Arc::new(RecordingRoot::default());
    let mut app = app_with(MapEnv::new(), Arc::clone(&root));

    app.wait(|root| ignis_core::startup::bind(root, 4000));
    app.startup().await.expect("bind through root handle");
    assert_eq!(*root.ports.lock().unwrap(), vec![4000]);
}

#[test]
fn tcp_root_reports_port_in_use() {
    let taken = TcpListener::bind("127.0.0.1:0").expect("reserve port");
    let port = taken.local_addr().expect("local addr").port();

    let mut app = App::builder()
        .registry(Arc::new(ExtensionRegistry::new()))
        .env(MapEnv::new())
        .root(Arc::new(TcpRoot::with_host("127.0.0.1")))
        .build();

    let err = futures::executor::block_on(app.listen(Some(port))).expect_err("port in use");
    assert!(matches!(err, StartupError::Bind { .. }));
}
