//! Integration tests for membrane sessions
//!
//! `Puppet` stands in for a real interpreter: it keeps the natives it is given
//! and, on every `run`, hands them to a scripted turn.

use heavenly_membrane::{
    compile, number_arg, ExportedProcedure, HostValue, Machine, MembraneError, MembraneResult,
    NativeFn, ObjectRef, ProcedureCall, Session,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

type Turn = Box<dyn FnMut(&Natives) -> MembraneResult<()> + Send>;

#[derive(Default, Clone)]
struct Natives(HashMap<String, NativeFn>);

impl Natives {
    fn invoke(&self, name: &str, args: &[&str]) -> MembraneResult<Option<String>> {
        let native = self.0.get(name).expect("native registered");
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        native(&args)
    }

    fn pray(&self, path: Value, args: Value) -> MembraneResult<Value> {
        let out = self
            .invoke("prayToHeaven", &[&path.to_string(), &args.to_string()])?
            .expect("pray returns a value");
        Ok(serde_json::from_str(&out).unwrap())
    }

    fn get(&self, path: Value) -> MembraneResult<Value> {
        let out = self
            .invoke("getFromHeaven", &[&path.to_string()])?
            .expect("get returns a value");
        Ok(serde_json::from_str(&out).unwrap())
    }
}

#[derive(Default)]
struct Puppet {
    natives: Natives,
    turns: Vec<Turn>,
    calls: Vec<ProcedureCall>,
}

impl Puppet {
    fn with_turn(
        mut self,
        turn: impl FnMut(&Natives) -> MembraneResult<()> + Send + 'static,
    ) -> Self {
        self.turns.push(Box::new(turn));
        self
    }
}

impl Machine for Puppet {
    fn register_native(&mut self, name: &str, native: NativeFn) {
        self.natives.0.insert(name.to_string(), native);
    }

    fn append_source(&mut self, _source: &str) -> MembraneResult<()> {
        Ok(())
    }

    fn run(&mut self) -> MembraneResult<()> {
        let natives = self.natives.clone();
        for turn in self.turns.iter_mut() {
            turn(&natives)?;
        }
        Ok(())
    }

    fn call_procedure(&mut self, call: &ProcedureCall) -> MembraneResult<()> {
        self.calls.push(call.clone());
        self.run()
    }
}

fn add() -> HostValue {
    HostValue::function("add", |_, args| {
        Ok(HostValue::from(number_arg(args, 0, "add")? + number_arg(args, 1, "add")?))
    })
}

fn make_counter() -> HostValue {
    HostValue::function("makeCounter", |_, _| {
        let n = Arc::new(AtomicI64::new(0));
        let inc = HostValue::function("inc", move |_, _| {
            Ok(HostValue::from(n.fetch_add(1, Ordering::SeqCst) + 1))
        });
        Ok(HostValue::Object(ObjectRef::plain().with("inc", inc)))
    })
}

#[test]
fn test_add_through_pray() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let puppet = Puppet::default().with_turn(move |natives| {
        let result = natives.pray(
            json!(["_global_add"]),
            json!([{"type": "primitive", "value": 2}, {"type": "primitive", "value": 3}]),
        )?;
        sink.lock().push(result);
        Ok(())
    });

    compile(puppet, &["add"], &[add()], "", &[] as &[&str]).unwrap();
    assert_eq!(
        seen.lock().as_slice(),
        &[json!({"type": "primitive", "value": 5})]
    );
}

#[test]
fn test_counter_registers_return_object() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let puppet = Puppet::default().with_turn(move |natives| {
        let counter = natives.pray(json!(["_global_makeCounter"]), json!([]))?;
        let path = counter["path"].clone();
        let mut inc_path = path.as_array().cloned().unwrap_or_default();
        inc_path.push(json!("inc"));

        let mut out = sink.lock();
        out.push(counter);
        out.push(natives.pray(Value::Array(inc_path.clone()), json!([]))?);
        out.push(natives.pray(Value::Array(inc_path), json!([]))?);
        Ok(())
    });

    compile(puppet, &["makeCounter"], &[make_counter()], "", &[] as &[&str]).unwrap();
    assert_eq!(
        seen.lock().as_slice(),
        &[
            json!({"type": "object", "path": ["_retobj0"], "keys": ["inc"]}),
            json!({"type": "primitive", "value": 1}),
            json!({"type": "primitive", "value": 2}),
        ]
    );
}

#[test]
fn test_get_and_send() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let puppet = Puppet::default().with_turn(move |natives| {
        natives.invoke(
            "sendToHeaven",
            &[r#"["_global_config","theme"]"#, r#"{"type":"primitive","value":"light"}"#],
        )?;
        sink.lock()
            .push(natives.get(json!(["_global_config", "theme"]))?);
        Ok(())
    });

    let config = HostValue::Object(ObjectRef::plain().with("theme", "dark"));
    let compiled = compile(puppet, &["config"], &[config.clone()], "", &[] as &[&str]).unwrap();

    assert_eq!(
        seen.lock().as_slice(),
        &[json!({"type": "primitive", "value": "light"})]
    );
    assert_eq!(config.get_property("theme"), Some(HostValue::from("light")));
    drop(compiled);
}

#[test]
fn test_literal_with_embedded_references() {
    let captured = Arc::new(Mutex::new(HostValue::Undefined));
    let slot = captured.clone();
    let keep = HostValue::function("keep", move |_, args| {
        *slot.lock() = args.first().cloned().unwrap_or_default();
        Ok(HostValue::Undefined)
    });
    let widget = HostValue::Object(ObjectRef::plain().with("id", "w1"));

    let puppet = Puppet::default().with_turn(|natives| {
        let literal = json!({
            "a": 1,
            "nested": [{"__heavenly": true, "type": "object", "path": ["_global_widget"], "keys": ["id"]}]
        });
        natives.pray(
            json!(["_global_keep"]),
            json!([{"type": "object-literal", "value": literal.to_string()}]),
        )?;
        Ok(())
    });

    compile(
        puppet,
        &["keep", "widget"],
        &[keep, widget.clone()],
        "",
        &[] as &[&str],
    )
    .unwrap();

    let kept = captured.lock().clone();
    assert_eq!(kept.get_property("a"), Some(HostValue::from(1)));
    let nested = kept.get_property("nested").unwrap();
    assert_eq!(nested.get_property("0"), Some(widget));
}

#[test]
fn test_bogus_wire_type_fails_the_turn() {
    let puppet = Puppet::default().with_turn(|natives| {
        natives.pray(json!(["_global_add"]), json!([{"type": "bogus", "value": 1}]))?;
        Ok(())
    });

    let err = compile(puppet, &["add"], &[add()], "", &[] as &[&str])
        .err()
        .unwrap();
    assert_eq!(err, MembraneError::UnknownWireType("bogus".to_string()));
}

#[test]
fn test_host_error_reaches_compile_caller() {
    let fail = HostValue::function("fail", |_, _| Err(MembraneError::host("disk on fire")));
    let puppet = Puppet::default().with_turn(|natives| {
        natives.pray(json!(["_global_fail"]), json!([]))?;
        Ok(())
    });

    let err = compile(puppet, &["fail"], &[fail], "", &[] as &[&str])
        .err()
        .unwrap();
    assert_eq!(err, MembraneError::Host("disk on fire".to_string()));
}

#[test]
fn test_exported_procedure_receives_arguments() {
    let compiled = compile(Puppet::default(), &[] as &[&str], &[], "", &["onTick"]).unwrap();
    let point = HostValue::Object(ObjectRef::plain().with("x", 1));
    compiled
        .call("onTick", &HostValue::Null, &[point.clone(), HostValue::from(true)])
        .unwrap();

    let store = compiled.session().store();
    assert_eq!(
        store
            .resolve_raw(&heavenly_membrane::Path::from(["_argobj0"]))
            .unwrap()
            .value,
        point
    );

    let call = compiled
        .session()
        .with_machine(|m| m.calls.last().cloned())
        .unwrap()
        .unwrap();
    assert_eq!(call.procedure, "onTick");
    assert_eq!(call.bindings.len(), 2);
    assert_eq!(call.bindings[1].value.type_name(), "primitive");
}

#[test]
fn test_calling_back_in_during_a_turn_is_reentrant() {
    let slot: Arc<Mutex<Option<ExportedProcedure<Puppet>>>> = Arc::new(Mutex::new(None));
    let handle = slot.clone();
    let call_back = HostValue::function("callBack", move |_, _| {
        let procedure = handle.lock().clone();
        match procedure {
            Some(procedure) => procedure.call(&HostValue::Undefined, &[]).map(|()| HostValue::Null),
            None => Ok(HostValue::Null),
        }
    });

    let puppet = Puppet::default();
    let session = Session::new(puppet);
    session.with_machine(|m| {
        m.turns.push(Box::new(|natives: &Natives| {
            natives.pray(json!(["_global_callBack"]), json!([]))?;
            Ok(())
        }));
    })
    .unwrap();

    let compiled = session
        .compile(&["callBack"], &[call_back], "", &["onTick"])
        .unwrap();
    *slot.lock() = compiled.procedure("onTick").cloned();

    let err = compiled
        .call("onTick", &HostValue::Undefined, &[])
        .unwrap_err();
    assert_eq!(
        err,
        MembraneError::Reentrant {
            procedure: "onTick".to_string()
        }
    );
}

#[test]
fn test_logs_are_collected_per_session() {
    let puppet = Puppet::default().with_turn(|natives| {
        natives.invoke("log", &["tick", "1"])?;
        Ok(())
    });
    let compiled = compile(puppet, &[] as &[&str], &[], "", &[] as &[&str]).unwrap();
    assert_eq!(compiled.session().take_logs(), vec!["tick 1".to_string()]);
}

#[test]
fn test_arity_is_checked() {
    let puppet = Puppet::default().with_turn(|natives| {
        natives.invoke("prayToHeaven", &["[\"x\"]"])?;
        Ok(())
    });
    let err = compile(puppet, &[] as &[&str], &[], "", &[] as &[&str])
        .err()
        .unwrap();
    assert_eq!(
        err,
        MembraneError::Arity {
            native: "prayToHeaven".to_string(),
            expected: 2,
            got: 1
        }
    );
}
