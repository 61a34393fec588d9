use crate::proxy::{RemoteObject, RemoteValue};
use serde_json::Value;

/// One argument to a remote call.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Remote(RemoteObject),
    /// Spliced into the surrounding argument list, recursively.
    List(Vec<Arg>),
}

/// Flattens nested lists and swaps proxies for their raw descriptors.
pub fn prepare_params(args: &[Arg]) -> Vec<Value> {
    let mut processed = Vec::with_capacity(args.len());
    extend_params(&mut processed, args);
    processed
}

fn extend_params(processed: &mut Vec<Value>, args: &[Arg]) {
    for arg in args {
        match arg {
            Arg::Value(value) => processed.push(value.clone()),
            Arg::Remote(object) => processed.push(object.data().clone()),
            Arg::List(items) => extend_params(processed, items),
        }
    }
}

impl From<RemoteObject> for Arg {
    fn from(object: RemoteObject) -> Self {
        Arg::Remote(object)
    }
}

impl From<&RemoteObject> for Arg {
    fn from(object: &RemoteObject) -> Self {
        Arg::Remote(object.clone())
    }
}

impl From<RemoteValue> for Arg {
    fn from(value: RemoteValue) -> Self {
        match value {
            RemoteValue::Remote(object) => Arg::Remote(object),
            RemoteValue::Json(value) => Arg::Value(value),
        }
    }
}

impl From<Vec<Arg>> for Arg {
    fn from(items: Vec<Arg>) -> Self {
        Arg::List(items)
    }
}

macro_rules! json_args {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Arg::Value(Value::from(value))
                }
            }
        )*
    };
}

json_args!(Value, &str, String, bool, i32, i64, u32, u64, usize, f64);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_lists_are_flattened() {
        let args = vec![
            Arg::from(1),
            Arg::List(vec![Arg::from("a"), Arg::List(vec![Arg::from(true)])]),
            Arg::from(json!({"k": "v"})),
        ];
        assert_eq!(
            prepare_params(&args),
            vec![json!(1), json!("a"), json!(true), json!({"k": "v"})]
        );
    }

    #[test]
    fn test_empty_list_contributes_nothing() {
        let args = vec![Arg::List(vec![]), Arg::from(Value::Null)];
        assert_eq!(prepare_params(&args), vec![Value::Null]);
    }
}
