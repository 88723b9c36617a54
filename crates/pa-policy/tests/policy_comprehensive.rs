use pa_policy::{Policy, Value};

#[test]
fn builder_produces_expected_shape() {
    let mut policy = Policy::new();
    let bundle = policy.append_bundle(None, "agent", "main", vec![]);
    let files = bundle.append_promise_type("files");
    files
        .append_promise("/etc/passwd", None, None, None)
        .unwrap()
        .append_constraint("mode", Value::string("0644"), false);

    assert_eq!(policy.bundles.len(), 1);
    assert_eq!(policy.bundles[0].promise_types.len(), 1);
    assert_eq!(policy.bundles[0].promise_types[0].promises.len(), 1);
    assert_eq!(
        policy.bundles[0].promise_types[0].promises[0].conlist[0].lval,
        "mode"
    );
}

#[test]
fn get_body_respects_namespace() {
    let mut policy = Policy::new();
    policy.append_body(Some("ns_a".into()), "perms", "shared", vec![]);
    policy.append_body(Some("ns_b".into()), "perms", "shared", vec![]);

    assert!(policy.get_body(Some("ns_a"), "perms", "shared").is_some());
    assert!(policy.get_body(Some("ns_c"), "perms", "shared").is_none());
    // Namespace-qualified lookup ignores the `namespace` filter argument.
    assert!(policy.get_body(Some("wrong"), "perms", "ns_b:shared").is_some());
}

#[test]
fn json_tree_has_top_level_shape() {
    let mut policy = Policy::new();
    policy.append_bundle(None, "agent", "main", vec![]);
    policy.append_body(None, "perms", "mog", vec![]);

    let json = policy.to_json();
    assert!(json.get("bundles").is_some());
    assert!(json.get("bodies").is_some());
    assert_eq!(json["bundles"].as_array().unwrap().len(), 1);
    assert_eq!(json["bodies"].as_array().unwrap().len(), 1);
}

#[test]
fn pretty_string_escapes_promiser() {
    let mut policy = Policy::new();
    policy
        .append_bundle(None, "agent", "main", vec![])
        .append_promise_type("files")
        .append_promise(r#"/etc/weird"name"#, None, None, None)
        .unwrap();

    let pretty = policy.to_pretty_string();
    assert!(pretty.contains(r#"\"name"#));
}
