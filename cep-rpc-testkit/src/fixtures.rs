//! A small in-memory object graph that answers RPC requests the way the
//! panel's ExtendScript host does.

use cep_rpc_core::{is_handle, Method, Request, ENUMERATOR_TAG, UNIQUE_ID_KEY};
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// A property value: plain JSON or a reference to another host object.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Value(Value),
    Object(u64),
}

impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        Slot::Value(value)
    }
}

/// Body of a host function: receives the bound receiver uid (if any) and
/// the prepared arguments.
pub type HostFn = Arc<dyn Fn(Option<u64>, &[Value]) -> Slot + Send + Sync>;

#[derive(Clone, Default)]
pub struct HostObject {
    pub properties: IndexMap<String, Slot>,
    /// Method name to the uid of its function object.
    pub methods: IndexMap<String, u64>,
    pub items: Vec<Slot>,
    pub instance_of: Option<String>,
    pub function: Option<HostFn>,
}

impl std::fmt::Debug for HostObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostObject")
            .field("properties", &self.properties)
            .field("methods", &self.methods)
            .field("items", &self.items)
            .field("instance_of", &self.instance_of)
            .field("callable", &self.function.is_some())
            .finish()
    }
}

type ClassFactory = Arc<dyn Fn(&mut HostModel) -> u64 + Send + Sync>;

/// Emulated remote runtime.
#[derive(Default)]
pub struct HostModel {
    objects: HashMap<u64, HostObject>,
    globals: IndexMap<String, Slot>,
    classes: HashMap<String, ClassFactory>,
    evals: HashMap<String, Slot>,
    calls: Vec<(u64, Option<u64>, Vec<Value>)>,
    next_uid: u64,
}

impl std::fmt::Debug for HostModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostModel")
            .field("objects", &self.objects.len())
            .field("globals", &self.globals.keys().collect::<Vec<_>>())
            .field("classes", &self.classes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HostModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&mut self, object: HostObject) -> u64 {
        self.next_uid += 1;
        self.objects.insert(self.next_uid, object);
        self.next_uid
    }

    pub fn add_function<F>(&mut self, body: F) -> u64
    where
        F: Fn(Option<u64>, &[Value]) -> Slot + Send + Sync + 'static,
    {
        self.add_object(HostObject {
            function: Some(Arc::new(body)),
            ..HostObject::default()
        })
    }

    /// Adds a method to `owner`, backed by a new function object.
    pub fn add_method<F>(&mut self, owner: u64, name: &str, body: F) -> u64
    where
        F: Fn(Option<u64>, &[Value]) -> Slot + Send + Sync + 'static,
    {
        let function = self.add_function(body);
        if let Some(object) = self.objects.get_mut(&owner) {
            object.methods.insert(name.to_string(), function);
        }
        function
    }

    pub fn bind_global(&mut self, name: &str, slot: Slot) {
        self.globals.insert(name.to_string(), slot);
    }

    pub fn define_class<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&mut HostModel) -> u64 + Send + Sync + 'static,
    {
        self.classes.insert(name.to_string(), Arc::new(factory));
    }

    pub fn define_eval(&mut self, expression: &str, slot: Slot) {
        self.evals.insert(expression.to_string(), slot);
    }

    pub fn object(&self, uid: u64) -> Option<&HostObject> {
        self.objects.get(&uid)
    }

    pub fn property(&self, uid: u64, name: &str) -> Option<&Slot> {
        self.objects.get(&uid)?.properties.get(name)
    }

    /// Every call made so far as `(function uid, receiver uid, args)`.
    pub fn calls(&self) -> &[(u64, Option<u64>, Vec<Value>)] {
        &self.calls
    }

    /// The descriptor the host sends for `uid`.
    pub fn descriptor(&self, uid: u64) -> Value {
        let Some(object) = self.objects.get(&uid) else {
            return Value::Null;
        };
        let methods: Map<String, Value> = object
            .methods
            .keys()
            .map(|name| (name.clone(), json!({})))
            .collect();
        let mut descriptor = json!({
            UNIQUE_ID_KEY: uid,
            "properties": object.properties.keys().collect::<Vec<_>>(),
            "methods": methods,
        });
        if let Some(tag) = &object.instance_of {
            descriptor["instanceof"] = Value::from(tag.as_str());
        }
        descriptor
    }

    fn render(&self, slot: &Slot) -> Value {
        match slot {
            Slot::Value(value) => value.clone(),
            Slot::Object(uid) => self.descriptor(*uid),
        }
    }

    fn to_slot(value: &Value) -> Slot {
        if is_handle(value) {
            if let Some(uid) = value.get(UNIQUE_ID_KEY).and_then(Value::as_u64) {
                return Slot::Object(uid);
            }
        }
        Slot::Value(value.clone())
    }

    /// Resolves the serialized target descriptor sent as `params[0]`.
    fn target_uid(params: &[Value]) -> Option<u64> {
        let text = params.first()?.as_str()?;
        let descriptor: Value = serde_json::from_str(text).ok()?;
        descriptor.get(UNIQUE_ID_KEY)?.as_u64()
    }

    /// Computes the result for one request.
    pub fn respond(&mut self, request: &Request) -> Value {
        let params = &request.params;
        match request.method {
            Method::GetGlobalScope => {
                let scope: Map<String, Value> = self
                    .globals
                    .iter()
                    .map(|(name, slot)| (name.clone(), self.render(slot)))
                    .collect();
                Value::Object(scope)
            }
            Method::Get => {
                let (Some(uid), Some(name)) =
                    (Self::target_uid(params), params.get(1).and_then(Value::as_str))
                else {
                    return Value::Null;
                };
                let Some(object) = self.objects.get(&uid) else {
                    return Value::Null;
                };
                if let Some(slot) = object.properties.get(name) {
                    return self.render(slot);
                }
                if let Some(function) = object.methods.get(name) {
                    return self.descriptor(*function);
                }
                // Enumerators expose their items by name-indexed lookups too.
                if object.instance_of.as_deref() == Some(ENUMERATOR_TAG) {
                    let slot = name.parse::<usize>().ok().and_then(|i| object.items.get(i));
                    if let Some(slot) = slot {
                        return self.render(slot);
                    }
                }
                Value::Null
            }
            Method::Set => {
                let (Some(uid), Some(name), Some(value)) = (
                    Self::target_uid(params),
                    params.get(1).and_then(Value::as_str),
                    params.get(2),
                ) else {
                    return Value::Null;
                };
                if let Some(object) = self.objects.get_mut(&uid) {
                    object.properties.insert(name.to_string(), Self::to_slot(value));
                }
                value.clone()
            }
            Method::GetIndex => {
                let (Some(uid), Some(index)) =
                    (Self::target_uid(params), params.get(1).and_then(Value::as_u64))
                else {
                    return Value::Null;
                };
                let slot = self
                    .objects
                    .get(&uid)
                    .and_then(|object| object.items.get(index as usize))
                    .cloned();
                slot.map_or(Value::Null, |slot| self.render(&slot))
            }
            Method::Call => {
                let Some(uid) = Self::target_uid(params) else {
                    return Value::Null;
                };
                let receiver = params.get(1).and_then(Value::as_u64);
                let args: Vec<Value> = params.iter().skip(2).cloned().collect();
                self.calls.push((uid, receiver, args.clone()));

                let Some(function) = self.objects.get(&uid).and_then(|o| o.function.clone())
                else {
                    return Value::Null;
                };
                let slot = function(receiver, &args);
                self.render(&slot)
            }
            Method::New => {
                let Some(class) = params.first().and_then(Value::as_str) else {
                    return Value::Null;
                };
                let Some(factory) = self.classes.get(class).cloned() else {
                    return json!(format!("ReferenceError: {} is undefined", class));
                };
                let uid = factory(self);
                self.descriptor(uid)
            }
            Method::Eval => {
                let expression = params.first().and_then(Value::as_str).unwrap_or_default();
                self.evals
                    .get(expression)
                    .map_or(Value::Null, |slot| self.render(slot))
            }
        }
    }

    /// A host shaped like Photoshop: `app` with an active document and a
    /// `documents` enumerator, plus a constructible `ActionDescriptor`.
    pub fn photoshop() -> Self {
        let mut model = HostModel::new();

        let document = model.add_object(HostObject {
            properties: IndexMap::from([
                ("name".to_string(), Slot::Value(json!("shot_010.psd"))),
                ("fullName".to_string(), Slot::Value(json!("/projects/shot_010.psd"))),
                ("saved".to_string(), Slot::Value(json!(false))),
            ]),
            ..HostObject::default()
        });
        model.add_method(document, "save", |_, _| Slot::Value(json!(true)));
        model.add_method(document, "resizeImage", |_, args| {
            Slot::Value(json!({"width": args.first(), "height": args.get(1)}))
        });

        let documents = model.add_object(HostObject {
            properties: IndexMap::from([("length".to_string(), Slot::Value(json!(1)))]),
            items: vec![Slot::Object(document)],
            instance_of: Some(ENUMERATOR_TAG.to_string()),
            ..HostObject::default()
        });

        let app = model.add_object(HostObject {
            properties: IndexMap::from([
                ("name".to_string(), Slot::Value(json!("Adobe Photoshop"))),
                ("version".to_string(), Slot::Value(json!("22.0.0"))),
                ("activeDocument".to_string(), Slot::Object(document)),
                ("documents".to_string(), Slot::Object(documents)),
            ]),
            ..HostObject::default()
        });
        model.add_method(app, "open", move |_, _| Slot::Object(document));

        let alert = model.add_function(|receiver, args| {
            Slot::Value(json!({"receiver": receiver, "args": args}))
        });

        model.bind_global("app", Slot::Object(app));
        model.bind_global("alert", Slot::Object(alert));
        model.bind_global("hostVersion", Slot::Value(json!("2020")));

        model.define_class("ActionDescriptor", |model| {
            let descriptor = model.add_object(HostObject {
                properties: IndexMap::from([("count".to_string(), Slot::Value(json!(0)))]),
                ..HostObject::default()
            });
            model.add_method(descriptor, "putString", |_, args| {
                Slot::Value(args.get(1).cloned().unwrap_or(Value::Null))
            });
            descriptor
        });

        model.define_eval("app.documents.length", Slot::Value(json!(1)));
        model.define_eval("app", Slot::Object(app));
        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cep_rpc_core::CallId;

    fn request(method: Method, params: Vec<Value>) -> Request {
        Request::new(CallId::new(1), method, params)
    }

    #[test]
    fn test_global_scope_lists_bindings_in_order() {
        let mut model = HostModel::photoshop();
        let scope = model.respond(&request(Method::GetGlobalScope, vec![]));
        let names: Vec<&String> = scope.as_object().unwrap().keys().collect();
        assert_eq!(names.len(), 3);
        assert_eq!(scope["app"]["properties"][0], "name");
        assert_eq!(scope["hostVersion"], "2020");
    }

    #[test]
    fn test_get_and_set_property() {
        let mut model = HostModel::photoshop();
        let scope = model.respond(&request(Method::GetGlobalScope, vec![]));
        let app = serde_json::to_string(&scope["app"]).unwrap();

        let name = model.respond(&request(Method::Get, vec![json!(app), json!("name")]));
        assert_eq!(name, "Adobe Photoshop");

        model.respond(&request(Method::Set, vec![json!(app), json!("name"), json!("PS")]));
        let name = model.respond(&request(Method::Get, vec![json!(app), json!("name")]));
        assert_eq!(name, "PS");
    }

    #[test]
    fn test_unknown_class_is_reference_error() {
        let mut model = HostModel::photoshop();
        let result = model.respond(&request(Method::New, vec![json!("Nope")]));
        assert!(result.as_str().unwrap().starts_with("ReferenceError"));
    }
}
