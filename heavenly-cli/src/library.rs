//! Demo host libraries linkable from a session file

use heavenly_membrane::{arg, number_arg, HostValue, MembraneError, ObjectRef};
use serde::{Deserialize, Serialize};

/// Longest string `text.repeat` will build, in bytes
const MAX_REPEAT_BYTES: usize = 1 << 20;

/// Built-in host library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Library {
    /// `math`: constants and numeric helpers
    Math,
    /// `counter`: a factory of stateful counter objects
    Counter,
    /// `text`: string helpers
    Text,
}

impl Library {
    /// Global name the library is linked under
    pub fn name(self) -> &'static str {
        match self {
            Library::Math => "math",
            Library::Counter => "counter",
            Library::Text => "text",
        }
    }

    pub fn value(self) -> HostValue {
        match self {
            Library::Math => math(),
            Library::Counter => counter(),
            Library::Text => text(),
        }
    }
}

fn math() -> HostValue {
    let lib = ObjectRef::plain()
        .with("pi", std::f64::consts::PI)
        .with(
            "add",
            HostValue::function("add", |_, args| {
                Ok(HostValue::from(
                    number_arg(args, 0, "add")? + number_arg(args, 1, "add")?,
                ))
            }),
        )
        .with(
            "max",
            HostValue::function("max", |_, args| {
                let max = args
                    .iter()
                    .filter_map(HostValue::as_number)
                    .fold(f64::NEG_INFINITY, f64::max);
                Ok(HostValue::from(max))
            }),
        )
        .with(
            "sqrt",
            HostValue::function("sqrt", |_, args| {
                let x = number_arg(args, 0, "sqrt")?;
                if x < 0.0 {
                    return Err(MembraneError::host(format!("sqrt of negative number {}", x)));
                }
                Ok(HostValue::from(x.sqrt()))
            }),
        );
    HostValue::Object(lib)
}

/// Counter objects keep their state in a `count` property and read it
/// through the receiver, so detached methods fail loudly.
fn counter() -> HostValue {
    let create = HostValue::function("create", |_, args| {
        let start = arg(args, 0).as_number().unwrap_or(0.0);
        let counter = ObjectRef::plain()
            .with("count", start)
            .with("inc", HostValue::function("inc", |this, _| step(this, 1.0)))
            .with("dec", HostValue::function("dec", |this, _| step(this, -1.0)));
        Ok(HostValue::Object(counter))
    });
    HostValue::Object(ObjectRef::plain().with("create", create))
}

fn step(this: &HostValue, delta: f64) -> Result<HostValue, MembraneError> {
    let counter = this
        .as_object()
        .ok_or_else(|| MembraneError::host("counter method called without a counter"))?;
    let next = counter.get("count").as_number().unwrap_or(0.0) + delta;
    counter.set("count", HostValue::from(next));
    Ok(HostValue::from(next))
}

fn text() -> HostValue {
    let lib = ObjectRef::plain()
        .with(
            "upper",
            HostValue::function("upper", |_, args| {
                Ok(HostValue::from(string_arg(args, 0, "upper")?.to_uppercase()))
            }),
        )
        .with(
            "repeat",
            HostValue::function("repeat", |_, args| {
                let s = string_arg(args, 0, "repeat")?;
                let n = number_arg(args, 1, "repeat")?;
                if n < 0.0 || n.fract() != 0.0 || n > MAX_REPEAT_BYTES as f64 {
                    return Err(MembraneError::host(format!("invalid repeat count {}", n)));
                }
                let count = n as usize;
                if s.len().saturating_mul(count) > MAX_REPEAT_BYTES {
                    return Err(MembraneError::host(format!(
                        "repeat result exceeds {} bytes",
                        MAX_REPEAT_BYTES
                    )));
                }
                Ok(HostValue::from(s.repeat(count)))
            }),
        )
        .with(
            "join",
            HostValue::function("join", |_, args| {
                let list = arg(args, 0);
                let list = list
                    .as_object()
                    .ok_or_else(|| MembraneError::host("join expects an array"))?;
                let sep = arg(args, 1).as_str().unwrap_or(",").to_string();
                let parts: Vec<String> = (0..list.len())
                    .map(|i| display(&list.get(&i.to_string())))
                    .collect();
                Ok(HostValue::from(parts.join(&sep)))
            }),
        );
    HostValue::Object(lib)
}

fn string_arg(args: &[HostValue], index: usize, function: &str) -> Result<String, MembraneError> {
    arg(args, index)
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| MembraneError::host(format!("{} expects a string argument", function)))
}

fn display(value: &HostValue) -> String {
    match value {
        HostValue::String(s) => s.clone(),
        other => other
            .to_primitive_json()
            .map(|json| json.to_string())
            .unwrap_or_else(|| other.type_of().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(lib: &HostValue, name: &str) -> heavenly_membrane::FunctionRef {
        lib.get_property(name)
            .and_then(|v| v.as_function().cloned())
            .unwrap()
    }

    #[test]
    fn test_math() {
        let lib = Library::Math.value();
        let add = method(&lib, "add");
        assert_eq!(
            add.call(&HostValue::Undefined, &[HostValue::from(2), HostValue::from(3)])
                .unwrap(),
            HostValue::from(5)
        );
        let sqrt = method(&lib, "sqrt");
        assert!(sqrt.call(&HostValue::Undefined, &[HostValue::from(-1)]).is_err());
    }

    #[test]
    fn test_counter_state_lives_on_the_receiver() {
        let lib = Library::Counter.value();
        let created = method(&lib, "create")
            .call(&HostValue::Undefined, &[HostValue::from(10)])
            .unwrap();
        let inc = method(&created, "inc");
        assert_eq!(inc.call(&created, &[]).unwrap(), HostValue::from(11));
        assert_eq!(inc.call(&created, &[]).unwrap(), HostValue::from(12));
        assert!(inc.call(&HostValue::Undefined, &[]).is_err());
    }

    #[test]
    fn test_text() {
        let lib = Library::Text.value();
        let list = HostValue::Object(ObjectRef::array([
            HostValue::from("a"),
            HostValue::from(1),
            HostValue::from(true),
        ]));
        let joined = method(&lib, "join")
            .call(&HostValue::Undefined, &[list, HostValue::from("-")])
            .unwrap();
        assert_eq!(joined, HostValue::from("a-1-true"));

        let upper = method(&lib, "upper")
            .call(&HostValue::Undefined, &[HostValue::from("hey")])
            .unwrap();
        assert_eq!(upper, HostValue::from("HEY"));
    }

    #[test]
    fn test_repeat_is_bounded() {
        let repeat = method(&Library::Text.value(), "repeat");
        let call = |s: &str, n: f64| {
            repeat.call(&HostValue::Undefined, &[HostValue::from(s), HostValue::from(n)])
        };

        assert_eq!(call("ab", 3.0).unwrap(), HostValue::from("ababab"));
        assert_eq!(call("ab", 0.0).unwrap(), HostValue::from(""));
        assert!(call("ab", -1.0).is_err());
        assert!(call("ab", 1.5).is_err());
        assert!(call("ab", 1e18).is_err());
        assert!(call("", 1e18).is_err());
        assert!(matches!(
            call("abcd", (MAX_REPEAT_BYTES / 2) as f64),
            Err(MembraneError::Host(message)) if message.contains("exceeds")
        ));
    }
}
