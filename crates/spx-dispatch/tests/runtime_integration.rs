//! Configuration files, coercion levels and shared use across threads

use std::io::Write;
use std::thread;

use spx_dispatch::{
    Coercion, DispatchConfig, DispatchError, Dispatcher, ErrorMode, SharedDispatcher,
};
use spx_model::{NdArray, Value};
use spx_toolkit::{SIGNATURES, Toolkit};

fn registered(toolkit: &Toolkit, config: DispatchConfig) -> Dispatcher {
    let mut dispatcher = Dispatcher::with_config(toolkit.library(), config);
    dispatcher
        .register_table_json(SIGNATURES)
        .expect("reference table registers");
    dispatcher
}

fn int_vector(values: Vec<i64>) -> Value {
    Value::Array(NdArray::from_i64(vec![values.len()], values).expect("shape matches"))
}

#[test]
fn test_config_file_sets_modes() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(file, r#"{{"error_mode":"raise","coercion":"check"}}"#).expect("write config");

    let config = DispatchConfig::load(file.path()).expect("config parses");
    assert_eq!(config.error_mode, ErrorMode::Raise);
    assert_eq!(config.coercion, Coercion::Check);

    let toolkit = Toolkit::standard();
    let mut dispatcher = registered(&toolkit, config);
    let err = dispatcher
        .call("bodn2c", vec![Value::from("PLUTO")])
        .expect_err("raise mode by default");
    assert!(matches!(err, DispatchError::NotFound { .. }));
}

#[test]
fn test_malformed_config_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(file, r#"{{"coercion":"loose"}}"#).expect("write config");
    assert!(matches!(
        DispatchConfig::load(file.path()),
        Err(DispatchError::Json(_))
    ));
}

#[test]
fn test_check_level_rejects_int_vectors() {
    let toolkit = Toolkit::standard();
    let mut dispatcher = registered(&toolkit, DispatchConfig::default());

    dispatcher.set_coercion(Coercion::Check);
    let err = dispatcher
        .call("vnorm", vec![int_vector(vec![3, 4, 0])])
        .expect_err("ints are not floats under check");
    assert!(matches!(err, DispatchError::TypeMismatch { .. }));
    assert_eq!(dispatcher.native().call_count(), 0);

    dispatcher.set_coercion(Coercion::Convert);
    let out = dispatcher
        .call("vnorm", vec![int_vector(vec![3, 4, 0])])
        .expect("ints convert to floats");
    assert_eq!(out, vec![Value::Float(5.0)]);
}

#[test]
fn test_pool_changes_reach_registered_routines() {
    let toolkit = Toolkit::standard();
    let mut dispatcher = registered(&toolkit, DispatchConfig::default());

    let out = dispatcher
        .call("bodn2c", vec![Value::from("VULCAN")])
        .expect("flag mode");
    assert_eq!(out[1], Value::Bool(false));

    toolkit.pool_mut().define_body(-77, "VULCAN");
    let out = dispatcher
        .call("bodn2c", vec![Value::from("vulcan")])
        .expect("defined now");
    assert_eq!(out, vec![Value::Int(-77), Value::Bool(true)]);
}

#[test]
fn test_shared_dispatcher_across_threads() {
    let toolkit = Toolkit::standard();
    let shared = SharedDispatcher::from(registered(&toolkit, DispatchConfig::default()));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let shared = shared.clone();
            thread::spawn(move || {
                let scale = f64::from(i + 1);
                let v = Value::Array(NdArray::vector(vec![0.0, 3.0 * scale, 4.0 * scale]));
                shared.call("vnorm", vec![v]).expect("norm")
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let out = handle.join().expect("thread finished");
        assert_eq!(out, vec![Value::Float(5.0 * (i as f64 + 1.0))]);
    }
    assert_eq!(shared.lock().native().call_count(), 4);

    shared.with(|dispatcher| {
        dispatcher.use_errors(&[]).expect("global raise mode");
    });
    let err = shared
        .call("bodn2c", vec![Value::from("PLUTO")])
        .expect_err("raise mode now");
    assert!(matches!(err, DispatchError::NotFound { .. }));
}
