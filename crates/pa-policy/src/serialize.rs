// SPDX-License-Identifier: MIT OR Apache-2.0
//! Round-trip serialization to/from the language-neutral JSON tree (§4.1).

use crate::model::{Body, Bundle, Constraint, Policy, Promise, PromiseType};
use crate::value::Value;
use serde_json::{Map, Value as Json, json};
use std::fmt;

/// An error converting a JSON tree back into a [`Policy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyJsonError(pub String);

impl fmt::Display for PolicyJsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid policy JSON: {}", self.0)
    }
}

impl std::error::Error for PolicyJsonError {}

type JResult<T> = Result<T, PolicyJsonError>;

fn err(msg: impl Into<String>) -> PolicyJsonError {
    PolicyJsonError(msg.into())
}

fn get<'a>(obj: &'a Map<String, Json>, key: &str) -> JResult<&'a Json> {
    obj.get(key).ok_or_else(|| err(format!("missing field `{key}`")))
}

fn as_str(v: &Json) -> JResult<&str> {
    v.as_str().ok_or_else(|| err("expected a string"))
}

fn as_obj(v: &Json) -> JResult<&Map<String, Json>> {
    v.as_object().ok_or_else(|| err("expected an object"))
}

fn as_arr(v: &Json) -> JResult<&Vec<Json>> {
    v.as_array().ok_or_else(|| err("expected an array"))
}

impl Value {
    /// Serializes a value to its JSON tree shape.
    #[must_use]
    pub fn to_json(&self) -> Json {
        match self {
            Value::Scalar { kind, value } => match kind {
                crate::value::ScalarKind::String => json!({"type": "string", "value": value}),
                crate::value::ScalarKind::Symbol => json!({"type": "symbol", "value": value}),
            },
            Value::List { value } => {
                json!({"type": "list", "value": value.iter().map(Value::to_json).collect::<Vec<_>>()})
            }
            Value::FnCall { name, arguments } => json!({
                "type": "functionCall",
                "name": name,
                "arguments": arguments.iter().map(Value::to_json).collect::<Vec<_>>(),
            }),
            Value::Container { value } => json!({"type": "container", "value": value}),
            Value::NoPromisee => json!({"type": "noPromisee"}),
        }
    }

    /// Parses a value back from its JSON tree shape.
    pub fn from_json(j: &Json) -> JResult<Value> {
        let obj = as_obj(j)?;
        let ty = as_str(get(obj, "type")?)?;
        match ty {
            "string" => Ok(Value::string(as_str(get(obj, "value")?)?.to_string())),
            "symbol" => Ok(Value::symbol(as_str(get(obj, "value")?)?.to_string())),
            "list" => {
                let items = as_arr(get(obj, "value")?)?
                    .iter()
                    .map(Value::from_json)
                    .collect::<JResult<Vec<_>>>()?;
                Ok(Value::list(items))
            }
            "functionCall" => {
                let name = as_str(get(obj, "name")?)?.to_string();
                let args = as_arr(get(obj, "arguments")?)?
                    .iter()
                    .map(Value::from_json)
                    .collect::<JResult<Vec<_>>>()?;
                Ok(Value::fncall(name, args))
            }
            "container" => Ok(Value::container(get(obj, "value")?.clone())),
            "noPromisee" => Ok(Value::NoPromisee),
            other => Err(err(format!("unknown value type `{other}`"))),
        }
    }
}

fn constraint_to_json(c: &Constraint) -> Json {
    let mut obj = Map::new();
    if let Some(line) = c.line {
        obj.insert("line".into(), json!(line));
    }
    obj.insert("lval".into(), json!(c.lval));
    obj.insert("rval".into(), c.rval.to_json());
    Json::Object(obj)
}

fn constraint_from_json(j: &Json) -> JResult<(String, Value, Option<u32>)> {
    let obj = as_obj(j)?;
    let lval = as_str(get(obj, "lval")?)?.to_string();
    let rval = Value::from_json(get(obj, "rval")?)?;
    let line = obj.get("line").and_then(Json::as_u64).map(|n| n as u32);
    Ok((lval, rval, line))
}

fn promise_to_json(p: &Promise) -> Json {
    let mut obj = Map::new();
    if let Some(line) = p.line {
        obj.insert("line".into(), json!(line));
    }
    obj.insert("promiser".into(), json!(p.promiser));
    if p.promisee != Value::NoPromisee {
        obj.insert("promisee".into(), p.promisee.to_json());
    }
    obj.insert(
        "attributes".into(),
        Json::Array(p.conlist.iter().map(constraint_to_json).collect()),
    );
    if let Some(comment) = &p.comment {
        obj.insert("comment".into(), json!(comment));
    }
    Json::Object(obj)
}

fn promise_from_json(j: &Json, classes: &str) -> JResult<Promise> {
    let obj = as_obj(j)?;
    let promiser = as_str(get(obj, "promiser")?)?.to_string();
    let promisee = match obj.get("promisee") {
        Some(v) => Value::from_json(v)?,
        None => Value::NoPromisee,
    };
    let line = obj.get("line").and_then(Json::as_u64).map(|n| n as u32);
    let comment = obj.get("comment").and_then(Json::as_str).map(str::to_string);
    let mut promise = Promise {
        promiser,
        promisee,
        classes: classes.to_string(),
        conlist: Vec::new(),
        comment,
        line,
    };
    for a in as_arr(get(obj, "attributes")?)? {
        let (lval, rval, line) = constraint_from_json(a)?;
        promise.conlist.push(crate::model::Constraint {
            lval,
            rval,
            classes: classes.to_string(),
            references_body: false,
            line,
        });
    }
    Ok(promise)
}

fn promise_type_to_json(pt: &PromiseType) -> Json {
    let mut contexts: Vec<Json> = Vec::new();
    let mut i = 0;
    while i < pt.promises.len() {
        let classes = &pt.promises[i].classes;
        let mut j = i + 1;
        while j < pt.promises.len() && &pt.promises[j].classes == classes {
            j += 1;
        }
        let promises: Vec<Json> = pt.promises[i..j].iter().map(promise_to_json).collect();
        contexts.push(json!({"name": classes, "promises": promises}));
        i = j;
    }
    let mut obj = Map::new();
    if let Some(line) = pt.line {
        obj.insert("line".into(), json!(line));
    }
    obj.insert("name".into(), json!(pt.name));
    obj.insert("contexts".into(), Json::Array(contexts));
    Json::Object(obj)
}

fn promise_type_from_json(j: &Json) -> JResult<PromiseType> {
    let obj = as_obj(j)?;
    let name = as_str(get(obj, "name")?)?.to_string();
    let line = obj.get("line").and_then(Json::as_u64).map(|n| n as u32);
    let mut promises = Vec::new();
    for ctx in as_arr(get(obj, "contexts")?)? {
        let ctx_obj = as_obj(ctx)?;
        let classes = as_str(get(ctx_obj, "name")?)?;
        for p in as_arr(get(ctx_obj, "promises")?)? {
            promises.push(promise_from_json(p, classes)?);
        }
    }
    Ok(PromiseType { name, line, promises })
}

fn bundle_to_json(b: &Bundle) -> Json {
    let mut obj = Map::new();
    if let Some(sp) = &b.source_path {
        obj.insert("sourcePath".into(), json!(sp));
    }
    if let Some(line) = b.line {
        obj.insert("line".into(), json!(line));
    }
    obj.insert("namespace".into(), json!(b.namespace));
    obj.insert("name".into(), json!(b.name));
    obj.insert("bundleType".into(), json!(b.bundle_type));
    obj.insert("arguments".into(), json!(b.args));
    obj.insert(
        "promiseTypes".into(),
        Json::Array(b.promise_types.iter().map(promise_type_to_json).collect()),
    );
    Json::Object(obj)
}

fn bundle_from_json(j: &Json) -> JResult<Bundle> {
    let obj = as_obj(j)?;
    let namespace = as_str(get(obj, "namespace")?)?.to_string();
    let name = as_str(get(obj, "name")?)?.to_string();
    let bundle_type = as_str(get(obj, "bundleType")?)?.to_string();
    let args = as_arr(get(obj, "arguments")?)?
        .iter()
        .map(|v| as_str(v).map(str::to_string))
        .collect::<JResult<Vec<_>>>()?;
    let source_path = obj.get("sourcePath").and_then(Json::as_str).map(str::to_string);
    let line = obj.get("line").and_then(Json::as_u64).map(|n| n as u32);
    let mut promise_types = Vec::new();
    for pt in as_arr(get(obj, "promiseTypes")?)? {
        promise_types.push(promise_type_from_json(pt)?);
    }
    Ok(Bundle {
        namespace,
        bundle_type,
        name,
        source_path,
        args,
        promise_types,
        line,
    })
}

fn body_to_json(b: &Body) -> Json {
    let mut contexts: Vec<Json> = Vec::new();
    let mut i = 0;
    while i < b.conlist.len() {
        let classes = &b.conlist[i].classes;
        let mut j = i + 1;
        while j < b.conlist.len() && &b.conlist[j].classes == classes {
            j += 1;
        }
        let attrs: Vec<Json> = b.conlist[i..j].iter().map(constraint_to_json).collect();
        contexts.push(json!({"name": classes, "attributes": attrs}));
        i = j;
    }
    let mut obj = Map::new();
    if let Some(sp) = &b.source_path {
        obj.insert("sourcePath".into(), json!(sp));
    }
    if let Some(line) = b.line {
        obj.insert("line".into(), json!(line));
    }
    obj.insert("namespace".into(), json!(b.namespace));
    obj.insert("name".into(), json!(b.name));
    obj.insert("bodyType".into(), json!(b.body_type));
    obj.insert("arguments".into(), json!(b.args));
    obj.insert("contexts".into(), Json::Array(contexts));
    Json::Object(obj)
}

fn body_from_json(j: &Json) -> JResult<Body> {
    let obj = as_obj(j)?;
    let namespace = as_str(get(obj, "namespace")?)?.to_string();
    let name = as_str(get(obj, "name")?)?.to_string();
    let body_type = as_str(get(obj, "bodyType")?)?.to_string();
    let args = as_arr(get(obj, "arguments")?)?
        .iter()
        .map(|v| as_str(v).map(str::to_string))
        .collect::<JResult<Vec<_>>>()?;
    let source_path = obj.get("sourcePath").and_then(Json::as_str).map(str::to_string);
    let line = obj.get("line").and_then(Json::as_u64).map(|n| n as u32);
    let mut conlist = Vec::new();
    for ctx in as_arr(get(obj, "contexts")?)? {
        let ctx_obj = as_obj(ctx)?;
        let classes = as_str(get(ctx_obj, "name")?)?.to_string();
        for a in as_arr(get(ctx_obj, "attributes")?)? {
            let (lval, rval, line) = constraint_from_json(a)?;
            conlist.push(Constraint {
                lval,
                rval,
                classes: classes.clone(),
                references_body: false,
                line,
            });
        }
    }
    Ok(Body {
        namespace,
        body_type,
        name,
        source_path,
        args,
        conlist,
        line,
    })
}

impl Policy {
    /// Serializes this policy to the language-neutral JSON tree described
    /// in §4.1: `{bundles: [...], bodies: [...], releaseId?}`.
    #[must_use]
    pub fn to_json(&self) -> Json {
        let mut tree = json!({
            "bundles": self.bundles.iter().map(bundle_to_json).collect::<Vec<_>>(),
            "bodies": self.bodies.iter().map(body_to_json).collect::<Vec<_>>(),
        });
        if let Some(release_id) = &self.release_id {
            tree["releaseId"] = json!(release_id);
        }
        tree
    }

    /// Parses a policy back from its JSON tree. Round-trips deterministically:
    /// `Policy::from_json(&p.to_json())` is equal to `p` under `PartialEq`.
    pub fn from_json(j: &Json) -> JResult<Policy> {
        let obj = as_obj(j)?;
        let bundles = as_arr(get(obj, "bundles")?)?
            .iter()
            .map(bundle_from_json)
            .collect::<JResult<Vec<_>>>()?;
        let bodies = as_arr(get(obj, "bodies")?)?
            .iter()
            .map(body_from_json)
            .collect::<JResult<Vec<_>>>()?;
        let release_id = match obj.get("releaseId") {
            Some(v) => Some(as_str(v)?.to_string()),
            None => None,
        };
        Ok(Policy {
            release_id,
            bundles,
            bodies,
        })
    }

    /// Renders this policy as a human-readable, CFEngine-style source
    /// listing, escaping scalar values per [`crate::value::escape_scalar`].
    #[must_use]
    pub fn to_pretty_string(&self) -> String {
        let mut out = String::new();
        for body in &self.bodies {
            out.push_str(&format!(
                "body {} {}({})\n{{\n",
                body.body_type,
                body.name,
                body.args.join(", ")
            ));
            for c in &body.conlist {
                out.push_str(&format!(
                    "    {} => {} :: {};\n",
                    c.lval,
                    c.rval.to_pretty_string(),
                    c.classes
                ));
            }
            out.push_str("}\n\n");
        }
        for bundle in &self.bundles {
            out.push_str(&format!(
                "bundle {} {}({})\n{{\n",
                bundle.bundle_type,
                bundle.name,
                bundle.args.join(", ")
            ));
            for pt in &bundle.promise_types {
                out.push_str(&format!("  {}:\n", pt.name));
                for p in &pt.promises {
                    out.push_str(&format!("    \"{}\"\n", crate::value::escape_scalar(&p.promiser)));
                    for c in &p.conlist {
                        out.push_str(&format!(
                            "        {} => {};\n",
                            c.lval,
                            c.rval.to_pretty_string()
                        ));
                    }
                }
            }
            out.push_str("}\n\n");
        }
        out
    }
}
