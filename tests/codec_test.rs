//! Object graph codec against self-referencing structures.

use lopdf::{dictionary, Document, Object, Stream};
use pdfjson::cos::{self, StreamPolicy};
use pdfjson::{CosValue, CosValueType};

#[test]
fn test_self_referencing_dictionary_is_marked_circular() {
    let mut doc = Document::with_version("1.7");
    let id = doc.new_object_id();
    doc.objects.insert(
        id,
        Object::Dictionary(dictionary! { "Type" => "Node", "Self" => id }),
    );

    let value = cos::serialize(&Object::Reference(id), &doc, StreamPolicy::Default).unwrap();
    assert_eq!(value.value_type, CosValueType::Dictionary);
    assert!(value.get("Self").unwrap().is_circular());
    assert_eq!(value.get("Type").unwrap().as_name(), Some("Node"));
}

#[test]
fn test_self_referencing_array_is_marked_circular() {
    let mut doc = Document::with_version("1.7");
    let id = doc.new_object_id();
    doc.objects
        .insert(id, Object::Array(vec![Object::Integer(1), Object::Reference(id)]));

    let value = cos::serialize(&Object::Reference(id), &doc, StreamPolicy::Default).unwrap();
    let items = value.items.unwrap();
    assert_eq!(items[0], CosValue::integer(1));
    assert!(items[1].is_circular());
}

#[test]
fn test_self_referencing_stream_is_marked_circular() {
    let mut doc = Document::with_version("1.7");
    let id = doc.new_object_id();
    doc.objects.insert(
        id,
        Object::Stream(Stream::new(dictionary! { "Me" => id }, b"q Q".to_vec())),
    );

    let value = cos::serialize(&Object::Reference(id), &doc, StreamPolicy::Default).unwrap();
    assert_eq!(value.value_type, CosValueType::Stream);
    let stream = value.stream.unwrap();
    let dictionary = stream.dictionary.unwrap();
    assert!(dictionary["Me"].is_circular());
    assert!(stream.raw_data.is_some());
}

#[test]
fn test_shared_object_is_not_circular() {
    let mut doc = Document::with_version("1.7");
    let shared = doc.add_object(dictionary! { "Kind" => "Shared" });
    let parent = Object::Dictionary(dictionary! { "A" => shared, "B" => shared });

    let value = cos::serialize(&parent, &doc, StreamPolicy::Default).unwrap();
    assert!(!value.get("A").unwrap().is_circular());
    assert_eq!(value.get("A"), value.get("B"));
}

#[test]
fn test_lightweight_policies_drop_stream_bytes() {
    let doc = Document::with_version("1.7");
    let stream = Object::Stream(Stream::new(dictionary! {}, b"BT ET".to_vec()));

    for policy in [
        StreamPolicy::AnnotationRawData,
        StreamPolicy::FormFieldRawData,
        StreamPolicy::ResourcesLightweight,
    ] {
        let value = cos::serialize(&stream, &doc, policy).unwrap();
        assert!(value.stream.unwrap().raw_data.is_none());
    }
}

#[test]
fn test_deserialize_restores_nested_structure() {
    let mut source = Document::with_version("1.7");
    let inner = source.add_object(dictionary! { "Width" => 10, "Name" => Object::string_literal("box") });
    let outer = Object::Dictionary(dictionary! {
        "Inner" => inner,
        "Values" => vec![1.into(), Object::Real(2.5), true.into()],
    });
    let value = cos::serialize(&outer, &source, StreamPolicy::Default).unwrap();

    let mut target = Document::with_version("1.7");
    let dict = cos::deserialize_dictionary(&value, &mut target).unwrap();
    let inner = dict.get(b"Inner").unwrap().as_dict().unwrap();
    assert_eq!(inner.get(b"Width").unwrap().as_i64().unwrap(), 10);
    assert_eq!(inner.get(b"Name").unwrap().as_str().unwrap(), b"box");
    let values = dict.get(b"Values").unwrap().as_array().unwrap();
    assert_eq!(values.len(), 3);
    assert_eq!(values[2], Object::Boolean(true));
}
