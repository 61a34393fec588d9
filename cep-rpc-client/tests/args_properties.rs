use cep_rpc_client::{prepare_params, Arg};
use proptest::prelude::*;
use serde_json::Value;

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::from),
    ]
}

fn arg() -> impl Strategy<Value = Arg> {
    scalar()
        .prop_map(Arg::Value)
        .prop_recursive(4, 32, 4, |inner| {
            prop::collection::vec(inner, 0..4).prop_map(Arg::List)
        })
}

fn leaves(arg: &Arg, out: &mut Vec<Value>) {
    match arg {
        Arg::Value(value) => out.push(value.clone()),
        Arg::Remote(object) => out.push(object.data().clone()),
        Arg::List(items) => items.iter().for_each(|item| leaves(item, out)),
    }
}

proptest! {
    #[test]
    fn prop_flattening_keeps_leaves_in_order(args in prop::collection::vec(arg(), 0..6)) {
        let mut expected = Vec::new();
        args.iter().for_each(|arg| leaves(arg, &mut expected));
        prop_assert_eq!(prepare_params(&args), expected);
    }

    #[test]
    fn prop_scalars_pass_through(values in prop::collection::vec(scalar(), 0..8)) {
        let args: Vec<Arg> = values.iter().cloned().map(Arg::from).collect();
        prop_assert_eq!(prepare_params(&args), values);
    }
}
