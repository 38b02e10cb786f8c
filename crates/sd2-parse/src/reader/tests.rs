use super::*;
use crate::value::ObjectPayload;

fn read(source: &str) -> Vec<Event> {
    Reader::new(source).read_to_vec().expect("parse error")
}

fn read_err(source: &str) -> ParseError {
    let mut reader = Reader::new(source);
    loop {
        match reader.next_event() {
            Ok(Event::EndDocument { .. }) => panic!("expected a parse error for {:?}", source),
            Ok(_) => {}
            Err(err) => return err,
        }
    }
}

fn attributes(events: &[Event]) -> Vec<(&str, &Value)> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Attribute { name, value, .. } => Some((name.as_str(), value)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_empty_document() {
    let events = read("");
    assert!(matches!(events[0], Event::StartDocument { .. }));
    assert!(matches!(events[1], Event::EndDocument { .. }));
    assert_eq!(events.len(), 2);
}

#[test]
fn test_simple_element() {
    let events = read("widget Button {\n  text = \"Click me\"\n  width = 120\n  theme = dark.primary\n}\n");

    assert!(matches!(events[0], Event::StartDocument { .. }));
    match &events[1] {
        Event::StartElement {
            keyword,
            id,
            type_expr,
            qualifiers,
            ..
        } => {
            assert_eq!(keyword, "widget");
            assert_eq!(id.as_deref(), Some("Button"));
            assert!(type_expr.is_none());
            assert!(qualifiers.is_empty());
        }
        other => panic!("expected StartElement, got {:?}", other),
    }

    let attrs = attributes(&events);
    assert_eq!(attrs.len(), 3);
    assert_eq!(attrs[0].0, "text");
    assert_eq!(attrs[0].1.as_str(), Some("Click me"));
    assert_eq!(attrs[1].0, "width");
    assert_eq!(attrs[1].1.as_int(), Some(120));
    assert_eq!(attrs[2].0, "theme");
    match attrs[2].1 {
        Value::Name { name, .. } => assert_eq!(name.to_string(), "dark.primary"),
        other => panic!("expected a bare name, got {:?}", other),
    }

    assert!(matches!(events[events.len() - 2], Event::EndElement { .. }));
    assert!(matches!(events[events.len() - 1], Event::EndDocument { .. }));
}

#[test]
fn test_namespace() {
    let events = read("page Home {\n  .header {\n    title = \"Welcome\"\n  }\n}\n");

    let ns_start = events
        .iter()
        .position(|e| matches!(e, Event::StartNamespace { name, .. } if name == "header"))
        .expect("expected StartNamespace");
    let attr = events
        .iter()
        .position(|e| matches!(e, Event::Attribute { name, .. } if name == "title"))
        .expect("expected title attribute");
    let ns_end = events
        .iter()
        .position(|e| matches!(e, Event::EndNamespace { .. }))
        .expect("expected EndNamespace");
    let el_end = events
        .iter()
        .position(|e| matches!(e, Event::EndElement { .. }))
        .expect("expected EndElement");

    assert!(ns_start < attr && attr < ns_end && ns_end < el_end);
}

#[test]
fn test_tuples_and_positional_constructor() {
    let events = read(
        "data P {\n  center = (-25.43, -49.27)\n  one = (42,)\n  point = Point(10, 20)\n}\n",
    );
    let attrs = attributes(&events);

    let center = attrs[0].1.as_tuple().expect("center should be a tuple");
    assert_eq!(center.len(), 2);
    assert_eq!(center[0].as_float(), Some(-25.43));
    assert_eq!(center[1].as_float(), Some(-49.27));

    let one = attrs[1].1.as_tuple().expect("one should be a tuple");
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].as_int(), Some(42));

    match attrs[2].1 {
        Value::ConstructorTuple { name, args, .. } => {
            assert_eq!(name.to_string(), "Point");
            assert_eq!(args[0].as_int(), Some(10));
            assert_eq!(args[1].as_int(), Some(20));
        }
        other => panic!("expected a positional constructor, got {:?}", other),
    }
}

#[test]
fn test_empty_tuple_and_bare_parenthesized() {
    let events = read("t X {\n  a = ()\n  b = (1)\n}\n");
    let attrs = attributes(&events);
    assert_eq!(attrs[0].1.as_tuple().unwrap().len(), 0);
    assert_eq!(attrs[1].1.as_tuple().unwrap().len(), 1);
}

#[test]
fn test_temporal_constructor_resolves_by_default() {
    let events = read("job cleanup {\n  start = instant(\"2024-03-15T14:30:00Z\")\n}\n");
    let attrs = attributes(&events);
    let (tag, _) = attrs[0].1.as_object().expect("expected a resolved object");
    assert_eq!(tag.to_string(), "temporal.instant");
}

#[test]
fn test_temporal_constructor_error() {
    let err = read_err("job cleanup {\n  start = instant(\"2024-03-15T14:30:00\")\n}\n");
    assert_eq!(err.code, ErrorCode::E3001);
}

#[test]
fn test_foreign_values() {
    let events = read("server api {\n  health = sh@'echo ok'\n  query = db.postgresql@\"SELECT 1\"\n}\n");
    let attrs = attributes(&events);

    match attrs[0].1 {
        Value::Foreign {
            content,
            constructor,
            ..
        } => {
            assert_eq!(content, "echo ok");
            assert_eq!(constructor.as_ref().unwrap().to_string(), "sh");
        }
        other => panic!("expected foreign, got {:?}", other),
    }
    match attrs[1].1 {
        Value::Foreign {
            content,
            constructor,
            ..
        } => {
            assert_eq!(content, "SELECT 1");
            assert_eq!(constructor.as_ref().unwrap().to_string(), "db.postgresql");
        }
        other => panic!("expected foreign, got {:?}", other),
    }
}

#[test]
fn test_untagged_foreign() {
    let events = read("server api {\n  check = @'true'\n}\n");
    let attrs = attributes(&events);
    match attrs[0].1 {
        Value::Foreign {
            content,
            constructor,
            ..
        } => {
            assert_eq!(content, "true");
            assert!(constructor.is_none());
        }
        other => panic!("expected foreign, got {:?}", other),
    }
}

#[test]
fn test_qualifier_without_arguments() {
    let err = read_err("field email : String unique {\n}\n");
    assert_eq!(err.code, ErrorCode::E2101);
}

#[test]
fn test_qualifiers() {
    let events = read("field email : String index email, name {\n}\n");
    match &events[1] {
        Event::StartElement {
            type_expr,
            qualifiers,
            ..
        } => {
            assert_eq!(type_expr.as_ref().unwrap().name.to_string(), "String");
            assert_eq!(qualifiers.len(), 1);
            assert_eq!(qualifiers[0].name, "index");
            let args: Vec<String> = qualifiers[0].args.iter().map(|a| a.to_string()).collect();
            assert_eq!(args, vec!["email", "name"]);
        }
        other => panic!("expected StartElement, got {:?}", other),
    }
}

#[test]
fn test_qualifier_continuation() {
    let events = read("widget X anchors top.left, top.right\n| layout grid {\n}\n");
    match &events[1] {
        Event::StartElement { qualifiers, .. } => {
            assert_eq!(qualifiers.len(), 2);
            assert_eq!(qualifiers[0].name, "anchors");
            assert_eq!(qualifiers[0].args.len(), 2);
            assert_eq!(qualifiers[1].name, "layout");
            assert_eq!(qualifiers[1].args[0].to_string(), "grid");
        }
        other => panic!("expected StartElement, got {:?}", other),
    }
}

#[test]
fn test_continuation_pipe_must_be_column_one() {
    let err = read_err("widget X anchors top\n | layout grid {\n}\n");
    assert_eq!(err.code, ErrorCode::E1002);
}

#[test]
fn test_stray_pipe() {
    assert_eq!(read_err("| x\n").code, ErrorCode::E1004);
    assert_eq!(read_err("widget X {\n| x\n}\n").code, ErrorCode::E1004);
}

#[test]
fn test_body_brace_must_share_line() {
    let err = read_err("widget Button\n{\n}\n");
    assert_eq!(err.code, ErrorCode::E1001);
}

#[test]
fn test_constructor_brace_must_share_line() {
    let err = read_err("w X {\n  p = Point\n{ x = 1\n}\n}\n");
    assert_eq!(err.code, ErrorCode::E1001);
}

#[test]
fn test_constructor_paren_must_share_line() {
    let err = read_err("w X {\n  p = Point\n(10, 20)\n}\n");
    assert_eq!(err.code, ErrorCode::E1005);
}

#[test]
fn test_named_constructor() {
    let events = read("w X {\n  p = Point { x = 1\n    y = 2\n  }\n}\n");
    let attrs = attributes(&events);
    match attrs[0].1 {
        Value::ConstructorNamed { name, attrs, .. } => {
            assert_eq!(name.to_string(), "Point");
            assert_eq!(attrs.len(), 2);
            assert_eq!(attrs[0].0, "x");
            assert_eq!(attrs[0].1.as_int(), Some(1));
            assert_eq!(attrs[1].0, "y");
            assert_eq!(attrs[1].1.as_int(), Some(2));
        }
        other => panic!("expected a named constructor, got {:?}", other),
    }
}

#[test]
fn test_named_constructor_duplicate_attribute() {
    let err = read_err("w X {\n  p = Point { x = 1\n    x = 2\n  }\n}\n");
    assert_eq!(err.code, ErrorCode::E2003);
}

#[test]
fn test_list_values() {
    let events = read("w X {\n  xs = [1, 2, 3,]\n  ys = [\n    \"a\",\n    \"b\"\n  ]\n}\n");
    let attrs = attributes(&events);
    let xs = attrs[0].1.as_list().unwrap();
    assert_eq!(xs.len(), 3);
    assert_eq!(xs[2].as_int(), Some(3));
    let ys = attrs[1].1.as_list().unwrap();
    assert_eq!(ys.len(), 2);
    assert_eq!(ys[1].as_str(), Some("b"));
}

#[test]
fn test_map_values() {
    let events = read("w X {\n  m = { a = 1, \"two words\" = 2, [42] = 3, [true] = 4 }\n}\n");
    let attrs = attributes(&events);
    let entries = attrs[0].1.as_map().unwrap();
    let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
    // Insertion order is preserved.
    assert_eq!(keys, vec!["a", "two words", "42", "true"]);
}

#[test]
fn test_map_duplicate_key() {
    let err = read_err("w X {\n  m = { a = 1, a = 2 }\n}\n");
    assert_eq!(err.code, ErrorCode::E2003);
}

#[test]
fn test_map_rejects_nested_element() {
    let err = read_err("w X {\n  m = { widget Button }\n}\n");
    assert_eq!(err.code, ErrorCode::E1000);
}

#[test]
fn test_map_rejects_namespace() {
    let err = read_err("w X {\n  m = { .ns = 1 }\n}\n");
    assert_eq!(err.code, ErrorCode::E1000);
}

#[test]
fn test_whitespace_before_at_is_rejected() {
    let err = read_err("w X {\n  q = sh @'echo ok'\n}\n");
    assert_eq!(err.code, ErrorCode::E4003);
}

#[test]
fn test_reserved_word_foreign_constructor() {
    assert_eq!(read_err("w X {\n  q = true@'x'\n}\n").code, ErrorCode::E4004);
    assert_eq!(read_err("w X {\n  q = null@'x'\n}\n").code, ErrorCode::E4004);
}

#[test]
fn test_backtick_identifiers() {
    let events = read("widget `my button` {\n  `weird name!` = 1\n}\n");
    match &events[1] {
        Event::StartElement { id, .. } => assert_eq!(id.as_deref(), Some("my button")),
        other => panic!("expected StartElement, got {:?}", other),
    }
    let attrs = attributes(&events);
    assert_eq!(attrs[0].0, "weird name!");
}

#[test]
fn test_backtick_requires_attribute() {
    let err = read_err("widget X {\n  `name` 1\n}\n");
    assert_eq!(err.code, ErrorCode::E1000);
}

#[test]
fn test_reserved_word_cannot_be_keyword() {
    let err = read_err("true X {\n}\n");
    assert_eq!(err.code, ErrorCode::E1000);
}

#[test]
fn test_generic_type_expr() {
    let events = read("field xs : Map<String, List<Int>> {\n}\n");
    match &events[1] {
        Event::StartElement { type_expr, .. } => {
            let type_expr = type_expr.as_ref().unwrap();
            assert_eq!(type_expr.name.to_string(), "Map");
            assert_eq!(type_expr.args.len(), 2);
            assert_eq!(type_expr.args[0].name.to_string(), "String");
            assert_eq!(type_expr.args[1].name.to_string(), "List");
            assert_eq!(type_expr.args[1].args[0].name.to_string(), "Int");
        }
        other => panic!("expected StartElement, got {:?}", other),
    }
}

#[test]
fn test_generic_type_missing_close() {
    let err = read_err("field xs : List<Int {\n}\n");
    assert_eq!(err.code, ErrorCode::E5001);
}

#[test]
fn test_document_annotation() {
    let events = read("#![sd2.version(2)]\nwidget X {\n}\n");
    match &events[1] {
        Event::DocumentAnnotation { name, args, .. } => {
            assert_eq!(name.to_string(), "sd2.version");
            assert_eq!(args.as_deref(), Some("2"));
        }
        other => panic!("expected DocumentAnnotation, got {:?}", other),
    }
}

#[test]
fn test_document_annotation_without_args() {
    let events = read("#![strict]\n");
    match &events[1] {
        Event::DocumentAnnotation { name, args, .. } => {
            assert_eq!(name.to_string(), "strict");
            assert!(args.is_none());
        }
        other => panic!("expected DocumentAnnotation, got {:?}", other),
    }
}

#[test]
fn test_document_annotation_after_element_is_error() {
    let err = read_err("widget X {\n}\n#![strict]\n");
    assert_eq!(err.code, ErrorCode::E1000);
}

#[test]
fn test_element_annotations() {
    let events = read("#[deprecated]\n#[route(GET, \"/users\")]\nendpoint users {\n}\n");
    match &events[1] {
        Event::StartElement { annotations, .. } => {
            assert_eq!(annotations.len(), 2);
            assert_eq!(annotations[0].name.to_string(), "deprecated");
            assert!(annotations[0].args.is_none());
            assert_eq!(annotations[1].name.to_string(), "route");
            assert_eq!(annotations[1].args.as_deref(), Some("GET, \"/users\""));
        }
        other => panic!("expected StartElement, got {:?}", other),
    }
}

#[test]
fn test_annotation_args_preserve_inner_brackets() {
    let events = read("#[check(len(name) < [3])]\nwidget X {\n}\n");
    match &events[1] {
        Event::StartElement { annotations, .. } => {
            assert_eq!(annotations[0].args.as_deref(), Some("len(name) < [3]"));
        }
        other => panic!("expected StartElement, got {:?}", other),
    }
}

#[test]
fn test_bodyless_elements() {
    let events = read("widget X\nwidget Y\n");
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            Event::StartDocument { .. } => "sd",
            Event::StartElement { .. } => "se",
            Event::EndElement { .. } => "ee",
            Event::EndDocument { .. } => "ed",
            _ => "?",
        })
        .collect();
    assert_eq!(kinds, vec!["sd", "se", "ee", "se", "ee", "ed"]);
}

#[test]
fn test_nested_elements_balance() {
    let events = read("a X {\n  b Y {\n    c Z\n  }\n}\n");
    let starts = events
        .iter()
        .filter(|e| matches!(e, Event::StartElement { .. }))
        .count();
    let ends = events
        .iter()
        .filter(|e| matches!(e, Event::EndElement { .. }))
        .count();
    assert_eq!(starts, 3);
    assert_eq!(ends, 3);

    // Every EndElement pairs with the most recent unclosed StartElement.
    let mut depth = 0i32;
    for event in &events {
        match event {
            Event::StartElement { .. } => depth += 1,
            Event::EndElement { .. } => {
                depth -= 1;
                assert!(depth >= 0);
            }
            _ => {}
        }
    }
    assert_eq!(depth, 0);
}

#[test]
fn test_value_locations() {
    let events = read("w X {\n  width = 120\n}\n");
    match &events[2] {
        Event::Attribute {
            name,
            value,
            location,
        } => {
            assert_eq!(name, "width");
            // The attribute is located at its name, the value at its first
            // token.
            assert_eq!(location.line, 2);
            assert_eq!(location.column, 3);
            assert_eq!(value.location().line, 2);
            assert_eq!(value.location().column, 11);
        }
        other => panic!("expected Attribute, got {:?}", other),
    }
}

#[test]
fn test_end_document_is_terminal() {
    let mut reader = Reader::new("widget X\n");
    loop {
        if matches!(reader.next_event().unwrap(), Event::EndDocument { .. }) {
            break;
        }
    }
    assert!(matches!(
        reader.next_event().unwrap(),
        Event::EndDocument { .. }
    ));
    assert!(matches!(
        reader.next_event().unwrap(),
        Event::EndDocument { .. }
    ));
}

#[test]
fn test_strict_error_is_terminal() {
    let mut reader = Reader::new("| x\n");
    reader.next_event().unwrap(); // StartDocument
    let first = reader.next_event().unwrap_err();
    assert_eq!(first.code, ErrorCode::E1004);
    let second = reader.next_event().unwrap_err();
    assert_eq!(first, second);
}

#[test]
fn test_unclosed_body_is_error() {
    let err = read_err("widget X {\n  a = 1\n");
    assert_eq!(err.code, ErrorCode::E1000);
}

#[test]
fn test_recovery_reports_and_resumes() {
    let errors = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = errors.clone();
    let options = ReaderOptions::new()
        .recovery(true)
        .on_error(move |err: &ParseError| sink.borrow_mut().push(err.code));

    let source = "widget X {\n  bad = = 1\n  good = 2\n}\n";
    let events = Reader::with_options(source, options)
        .read_to_vec()
        .expect("recovery mode should not return errors");

    assert_eq!(errors.borrow().as_slice(), &[ErrorCode::E1000]);
    let attrs = attributes(&events);
    assert_eq!(attrs.len(), 1);
    assert_eq!(attrs[0].0, "good");
    assert!(matches!(events[events.len() - 1], Event::EndDocument { .. }));
}

#[test]
fn test_recovery_closes_unclosed_scopes() {
    let errors = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let sink = errors.clone();
    let options = ReaderOptions::new()
        .recovery(true)
        .on_error(move |err: &ParseError| sink.borrow_mut().push(err.code));

    let events = Reader::with_options("widget X {\n  a = 1\n", options)
        .read_to_vec()
        .expect("recovery mode should not return errors");

    assert_eq!(errors.borrow().len(), 1);
    let ends = events
        .iter()
        .filter(|e| matches!(e, Event::EndElement { .. }))
        .count();
    assert_eq!(ends, 1);
    assert!(matches!(events[events.len() - 1], Event::EndDocument { .. }));
}

#[test]
fn test_recovery_drops_pending_annotations() {
    let options = ReaderOptions::new().recovery(true).on_error(|_| {});
    let source = "#[keep]\n= garbage\nwidget X {\n}\n";
    let events = Reader::with_options(source, options)
        .read_to_vec()
        .expect("recovery mode should not return errors");

    let element = events
        .iter()
        .find_map(|e| match e {
            Event::StartElement {
                keyword,
                annotations,
                ..
            } if keyword == "widget" => Some(annotations.clone()),
            _ => None,
        })
        .expect("widget element should survive recovery");
    assert!(element.is_empty());
}

#[test]
fn test_unknown_constructor_policy_error() {
    let options = ReaderOptions::new().unknown_constructors(UnknownConstructorPolicy::Error);
    let mut reader = Reader::with_options("w X {\n  p = Point(1, 2)\n}\n", options);
    let err = loop {
        match reader.next_event() {
            Ok(_) => {}
            Err(err) => break err,
        }
    };
    assert_eq!(err.code, ErrorCode::E5001);
}

#[test]
fn test_without_registry_keeps_constructors_raw() {
    let source = "job cleanup {\n  start = instant(\"2024-03-15T14:30:00Z\")\n}\n";

    let resolved = read(source);
    let raw = Reader::with_options(source, ReaderOptions::new().without_registry())
        .read_to_vec()
        .unwrap();

    assert_eq!(resolved.len(), raw.len());
    for (with, without) in resolved.iter().zip(raw.iter()) {
        match (with, without) {
            (
                Event::Attribute {
                    value: Value::Object { tag, .. },
                    ..
                },
                Event::Attribute {
                    value: Value::ConstructorTuple { name, .. },
                    ..
                },
            ) => {
                // The object stands exactly where the raw constructor was.
                assert_eq!(tag.to_string(), "temporal.instant");
                assert_eq!(name.to_string(), "instant");
            }
            _ => assert_eq!(with, without),
        }
    }
}

#[test]
fn test_custom_registry_type_tag_differs_from_name() {
    let mut registry = ConstructorRegistry::new();
    registry.register("rgb", "color.srgb", |call, _ctx| {
        let mut channels = [0i64; 3];
        for (slot, arg) in channels.iter_mut().zip(call.args.iter()) {
            *slot = arg.as_int().unwrap_or(0);
        }
        Ok(ObjectPayload::new(channels))
    });
    let options = ReaderOptions::new().registry(registry);

    let events = Reader::with_options("w X {\n  c = rgb(255, 128, 0)\n}\n", options)
        .read_to_vec()
        .unwrap();
    let attrs = attributes(&events);
    let (tag, payload) = attrs[0].1.as_object().unwrap();
    assert_eq!(tag.to_string(), "color.srgb");
    assert_eq!(payload.downcast_ref::<[i64; 3]>(), Some(&[255, 128, 0]));
}

#[test]
fn test_triple_quoted_attribute() {
    let source = "doc X {\n  text = \"\"\"\n      line one\n      line two\n      \"\"\"\n}\n";
    let events = read(source);
    let attrs = attributes(&events);
    assert_eq!(attrs[0].1.as_str(), Some("line one\nline two\n"));
}

#[test]
fn test_nested_constructor_resolution() {
    // A constructor nested in a list inside another value resolves too.
    let events = read("w X {\n  xs = [date(\"2024-01-01\"), 7]\n}\n");
    let attrs = attributes(&events);
    let xs = attrs[0].1.as_list().unwrap();
    assert!(matches!(xs[0], Value::Object { .. }));
    assert_eq!(xs[1].as_int(), Some(7));
}

#[test]
fn test_comments_are_invisible() {
    let events = read("// top\nwidget X { /* inline */\n  a = 1 // trailing\n}\n");
    let attrs = attributes(&events);
    assert_eq!(attrs.len(), 1);
    assert_eq!(attrs[0].1.as_int(), Some(1));
}

#[test]
fn test_hex_binary_and_underscored_ints() {
    let events = read("w X {\n  a = 0xFF\n  b = 0b1010\n  c = 1_000_000\n}\n");
    let attrs = attributes(&events);
    assert_eq!(attrs[0].1.as_int(), Some(255));
    assert_eq!(attrs[1].1.as_int(), Some(10));
    assert_eq!(attrs[2].1.as_int(), Some(1_000_000));
}

#[test]
fn test_bool_and_null_values() {
    let events = read("w X {\n  a = true\n  b = false\n  c = null\n}\n");
    let attrs = attributes(&events);
    assert_eq!(attrs[0].1.as_bool(), Some(true));
    assert_eq!(attrs[1].1.as_bool(), Some(false));
    assert!(attrs[2].1.is_null());
}

#[test]
fn test_attribute_needs_line_end() {
    let err = read_err("w X {\n  a = 1 b = 2\n}\n");
    assert_eq!(err.code, ErrorCode::E1000);
}
