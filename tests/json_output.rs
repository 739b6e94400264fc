use regex::Regex;
use serde_json::json;
use structfilter::filter::{remove_field_filter, Field, Filter, FilterFn};
use structfilter::json::{to_json, to_json_string_pretty};
use structfilter::types::{DataType, RecordField, ShapeId, Shapes};
use structfilter::value::{Dynamic, Heap, Value};

fn text(s: &str) -> Value {
    Value::Utf8(s.to_string())
}

fn lowercase_json_tag() -> FilterFn {
    Box::new(|f: &mut Field| {
        f.tag = format!("json:\"{}\"", f.name().to_lowercase()).into();
        Ok(())
    })
}

fn user_db_filter() -> Filter {
    Filter::new(vec![
        remove_field_filter(Some(Regex::new("^Password.*$").unwrap())),
        lowercase_json_tag(),
    ])
}

fn user_shape(shapes: &mut Shapes, login_time: ShapeId) -> ShapeId {
    let t = shapes.leaf(DataType::Utf8);
    shapes.new_record(
        "User",
        vec![
            RecordField::new("Name", t),
            RecordField::new("Password", t),
            RecordField::new("PasswordAdmin", t),
            RecordField::new("LoginTime", login_time),
        ],
    )
}

#[test]
fn user_db_renders_without_passwords() {
    let mut shapes = Shapes::new();
    let mut heap = Heap::new();
    let int = shapes.leaf(DataType::Int64);
    let user = user_shape(&mut shapes, int);
    let users = shapes.list(user);
    let db = heap.list(vec![
        Value::Record(vec![
            text("Alice"),
            text("$6$sensitive"),
            text("$6$verysensitive"),
            Value::Int64(1234567890),
        ]),
        Value::Record(vec![text("Bob"), text("$6$private"), text(""), Value::Int64(1357924680)]),
    ]);

    let mut filter = user_db_filter();
    let filtered = filter
        .convert(&mut shapes, &mut heap, Some(&Dynamic::new(users, db)))
        .unwrap()
        .unwrap();
    let rendered = to_json(&shapes, &heap, &filtered).unwrap();
    assert_eq!(
        rendered,
        json!([
            {"name": "Alice", "logintime": 1234567890},
            {"name": "Bob", "logintime": 1357924680},
        ])
    );

    let pretty = to_json_string_pretty(&shapes, &heap, &filtered).unwrap();
    assert!(!pretty.contains("sensitive"));
    assert!(pretty.contains("\"logintime\": 1234567890"));
}

#[test]
fn exempt_timestamp_keeps_its_own_tags() {
    let mut shapes = Shapes::new();
    let mut heap = Heap::new();
    let int = shapes.leaf(DataType::Int64);
    let t = shapes.leaf(DataType::Utf8);
    let timestamp = shapes.new_record(
        "Timestamp",
        vec![
            RecordField::new("Seconds", int).with_tag(r#"json:"secs""#),
            RecordField::new("zone", t).hidden(),
        ],
    );
    let user = user_shape(&mut shapes, timestamp);
    let alice = Value::Record(vec![
        text("Alice"),
        text("$6$sensitive"),
        text("$6$verysensitive"),
        Value::Record(vec![Value::Int64(1234567890), text("UTC")]),
    ]);

    let mut exempting = user_db_filter();
    exempting.register_exempt(&shapes, timestamp);
    let filtered = exempting
        .convert(&mut shapes, &mut heap, Some(&Dynamic::new(user, alice.clone())))
        .unwrap()
        .unwrap();
    assert_eq!(
        to_json(&shapes, &heap, &filtered).unwrap(),
        json!({"name": "Alice", "logintime": {"secs": 1234567890}})
    );

    let mut plain = user_db_filter();
    let filtered = plain
        .convert(&mut shapes, &mut heap, Some(&Dynamic::new(user, alice)))
        .unwrap()
        .unwrap();
    assert_eq!(
        to_json(&shapes, &heap, &filtered).unwrap(),
        json!({"name": "Alice", "logintime": {"seconds": 1234567890}})
    );
}

#[test]
fn recursive_values_render_through_placeholders() {
    let mut shapes = Shapes::new();
    let mut heap = Heap::new();
    let t = shapes.leaf(DataType::Utf8);
    let node = shapes.declare("Node");
    let next = shapes.optional(node);
    shapes
        .define_record(
            node,
            vec![
                RecordField::new("Label", t),
                RecordField::new("Password", t),
                RecordField::new("Next", next),
            ],
        )
        .unwrap();

    let tail = heap.pointer(Value::Record(vec![text("b"), text("pw"), Value::Null]));
    let head = Value::Record(vec![text("a"), text("pw"), tail]);

    let mut filter = user_db_filter();
    let filtered = filter
        .convert(&mut shapes, &mut heap, Some(&Dynamic::new(node, head)))
        .unwrap()
        .unwrap();
    assert_eq!(
        to_json(&shapes, &heap, &filtered).unwrap(),
        json!({"label": "a", "next": {"label": "b", "next": null}})
    );
}
