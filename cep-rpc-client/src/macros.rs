/// Builds the argument list for a remote call.
///
/// Each expression is converted with `Arg::from`, so JSON scalars, `Value`s,
/// proxies and nested `Vec<Arg>` lists can be mixed freely.
///
/// # Example
///
/// ```rust
/// use cep_rpc_client::args;
/// let args = args![5, "hello", true];
/// assert_eq!(args.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    [$($expr:expr),* $(,)?] => {
        vec![$(
            $crate::Arg::from($expr)
        ),*]
    };
}

#[cfg(test)]
mod tests {
    use crate::{prepare_params, Arg};
    use serde_json::json;

    #[test]
    fn test_args_macro() {
        let args = args![5, "hello", true];
        assert_eq!(args.len(), 3);
        assert_eq!(prepare_params(&args), vec![json!(5), json!("hello"), json!(true)]);
    }

    #[test]
    fn test_args_macro_nesting() {
        let args = args![json!(null), args![1.5, "x"], String::from("tail")];
        assert!(matches!(args[1], Arg::List(_)));
        assert_eq!(
            prepare_params(&args),
            vec![json!(null), json!(1.5), json!("x"), json!("tail")]
        );
    }

    #[test]
    fn test_empty_args_macro() {
        let args: Vec<Arg> = args![];
        assert!(args.is_empty());
    }
}
