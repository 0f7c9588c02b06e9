use serde_json::json;

use super::*;
use crate::config::{GraphConfig, ToolboxConfig};
use crate::geo::GeoFields;
use crate::memory::MemoryDatabase;

fn toolbox() -> Rc<Toolbox> {
    Toolbox::in_memory(ToolboxConfig::new("test").with_graph(GraphConfig::new("g"))).unwrap()
}

fn record(value: Value) -> WireRecord {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

#[test]
fn fresh_pod_is_new_and_changed() {
    let pod = Pod::new(&toolbox(), PodKind::Document, "notes");
    assert!(pod.is_new());
    assert!(pod.has_changed());
    assert_eq!(pod.id(), None);
    assert_eq!(pod.key(), None);
    assert_eq!(pod.collection(), "notes");
}

#[test]
fn set_id_derives_key() {
    let pod = Pod::new(&toolbox(), PodKind::Document, "notes");
    pod.set_id("people/ada").unwrap();
    assert_eq!(pod.key().as_deref(), Some("ada"));
    assert_eq!(pod.collection(), "people");
}

#[test]
fn second_set_id_fails_even_when_invalid() {
    let pod = Pod::new(&toolbox(), PodKind::Document, "notes");
    pod.set_id("notes/1").unwrap();

    for attempt in ["notes/2", "garbage", ""] {
        let err = pod.set_id(attempt).unwrap_err();
        assert!(matches!(err, PodError::IdAlreadySet(_)));
    }
    assert_eq!(pod.id().unwrap().to_string(), "notes/1");
}

#[test]
fn malformed_id_leaves_pod_untouched() {
    let pod = Pod::new(&toolbox(), PodKind::Document, "notes");
    for bad in ["notes", "/1", "notes/", "a/b/c"] {
        assert!(matches!(pod.set_id(bad), Err(PodError::MalformedId(_))));
    }
    assert_eq!(pod.id(), None);
    pod.set_id("notes/1").unwrap();
}

#[test]
fn key_is_never_settable() {
    let pod = Pod::new(&toolbox(), PodKind::Document, "notes");
    assert_eq!(pod.set_key("1"), Err(PodError::KeyNotSettable));
    assert_eq!(pod.key(), None);
}

#[test]
fn reserved_fields_are_rejected() {
    let toolbox = toolbox();
    let document = Pod::new(&toolbox, PodKind::Document, "notes");
    let edge = Pod::new(&toolbox, PodKind::Edge, "gEdgeCollection");

    for field in ["_id", "_key", "_rev", "_anything", DISTANCE_PARAMETER] {
        assert_eq!(document.get(field), Err(PodError::ReservedField(field.to_string())));
        assert!(document.set(field, 1).is_err());
    }
    for field in ["_from", "_to", "$label"] {
        assert!(edge.get(field).is_err());
        assert!(edge.set(field, "x").is_err());
    }
    assert!(document.get("$label").unwrap().is_none());
}

#[test]
fn get_returns_last_set_value() {
    let pod = Pod::new(&toolbox(), PodKind::Document, "notes");
    assert_eq!(pod.get("name").unwrap(), None);
    pod.set("name", "A").unwrap();
    pod.set("name", json!({"first": "B"})).unwrap();
    assert_eq!(pod.get("name").unwrap(), Some(json!({"first": "B"})));

    assert_eq!(pod.remove("name").unwrap(), Some(json!({"first": "B"})));
    assert_eq!(pod.get("name").unwrap(), None);
}

#[test]
fn setting_marks_hydrated_pod_changed() {
    let pod = Pod::from_wire(
        &toolbox(),
        PodKind::Document,
        "notes",
        &record(json!({"_id": "notes/1", "_rev": "r1", "title": "t"})),
    )
    .unwrap();
    assert!(!pod.is_new());
    assert!(!pod.has_changed());

    pod.set("title", "u").unwrap();
    assert!(pod.has_changed());
    assert!(!pod.is_new());
}

#[test]
fn wire_round_trip() {
    let input = record(json!({
        "_id": "notes/1",
        "_key": "1",
        "_rev": "r7",
        "title": "hello",
        "tags": ["a", "b"],
        "meta": {"views": 3}
    }));
    let pod = Pod::from_wire(&toolbox(), PodKind::Document, "notes", &input).unwrap();

    assert_eq!(pod.to_wire_format(), input);
    assert_eq!(pod.key().as_deref(), Some("1"));
    assert_eq!(pod.revision().as_deref(), Some("r7"));
}

#[test]
fn key_alone_derives_id_from_collection() {
    let pod = Pod::new(&toolbox(), PodKind::Document, "notes");
    pod.load_from_wire(&record(json!({"_key": "9", "x": 1}))).unwrap();
    assert_eq!(pod.id().unwrap().to_string(), "notes/9");
}

#[test]
fn conflicting_wire_id_is_rejected_without_mutation() {
    let pod = Pod::new(&toolbox(), PodKind::Document, "notes");
    pod.set_id("notes/1").unwrap();
    pod.set("x", 1).unwrap();

    let err = pod
        .load_from_wire(&record(json!({"_id": "notes/2", "x": 2})))
        .unwrap_err();
    assert!(matches!(err, PodError::IdAlreadySet(_)));
    assert_eq!(pod.get("x").unwrap(), Some(json!(1)));
    assert!(pod.is_new());
}

#[test]
fn raw_map_must_be_an_object() {
    let pod = Pod::new(&toolbox(), PodKind::Document, "notes");
    assert!(matches!(pod.load_from_raw_map(&json!([1, 2])), Err(PodError::InvalidRecord(_))));
    pod.load_from_raw_map(&json!({"_id": "notes/3", "a": true})).unwrap();
    assert_eq!(pod.get("a").unwrap(), Some(json!(true)));
}

#[test]
fn transaction_format_omits_identity() {
    let pod = Pod::from_wire(
        &toolbox(),
        PodKind::Document,
        "notes",
        &record(json!({"_id": "notes/1", "_rev": "r1", "title": "t"})),
    )
    .unwrap();
    let wire = pod.to_transaction_wire_format();
    assert_eq!(wire, record(json!({"_rev": "r1", "title": "t"})));

    let driver = pod.to_driver_format().unwrap();
    assert_eq!(driver, record(json!({"_key": "1", "_rev": "r1", "title": "t"})));
}

#[test]
fn edge_wire_format_carries_endpoints() {
    let input = record(json!({
        "_id": "gEdgeCollection/e1",
        "_key": "e1",
        "_rev": "r1",
        "_from": "gVertexCollection/a",
        "_to": "gVertexCollection/b",
        "$label": "knows"
    }));
    let edge = Pod::from_wire(&toolbox(), PodKind::Edge, "gEdgeCollection", &input).unwrap();

    assert_eq!(edge.to_wire_format(), input);
    assert_eq!(edge.label().as_deref(), Some("knows"));
    assert_eq!(edge.from_key().as_deref(), Some("a"));
    assert_eq!(edge.to_id().unwrap().to_string(), "gVertexCollection/b");
}

#[test]
fn edge_without_endpoint_cannot_be_persisted() {
    let toolbox = toolbox();
    let edge = Pod::new_edge(
        &toolbox,
        "gEdgeCollection",
        None,
        Some(Endpoint::Unresolved(DocumentId::parse("gVertexCollection/b").unwrap())),
    );
    assert_eq!(edge.to_driver_format(), Err(PodError::MissingEndpoint("from")));

    edge.set_internal_from("gVertexCollection/a").unwrap();
    let driver = edge.to_driver_format().unwrap();
    assert_eq!(driver.get("_from"), Some(&json!("gVertexCollection/a")));
}

#[test]
fn edge_operations_require_an_edge() {
    let pod = Pod::new(&toolbox(), PodKind::Vertex, "gVertexCollection");
    assert_eq!(pod.set_label("x"), Err(PodError::WrongKind { expected: "edge" }));
    assert_eq!(
        pod.set_internal_to("gVertexCollection/b"),
        Err(PodError::WrongKind { expected: "edge" })
    );
    assert!(pod.from().is_err());
    assert_eq!(pod.from_key(), None);
}

#[test]
fn distance_info_is_write_once() {
    let pod = Pod::from_wire(
        &toolbox(),
        PodKind::Document,
        "places",
        &record(json!({"_id": "places/1", DISTANCE_PARAMETER: 12.5, "name": "x"})),
    )
    .unwrap();
    assert_eq!(pod.distance(), None);
    assert!(pod.properties().get(DISTANCE_PARAMETER).is_none());

    let origin = Coordinates::new(1.0, 2.0);
    let reference = DocumentId::parse("places/0").unwrap();
    pod.set_distance_info(origin, Some(reference.clone())).unwrap();

    let err = pod
        .set_distance_info(Coordinates::new(9.0, 9.0), None)
        .unwrap_err();
    assert_eq!(err, PodError::DistanceAlreadySet);
    assert_eq!(pod.distance(), Some(12.5));
    assert_eq!(pod.reference_coordinates(), Some(origin));
    assert_eq!(pod.reference_id(), Some(reference));
}

#[test]
fn distance_info_needs_a_distance() {
    let pod = Pod::new(&toolbox(), PodKind::Document, "places");
    let err = pod.set_distance_info(Coordinates::new(0.0, 0.0), None).unwrap_err();
    assert_eq!(err, PodError::MissingDistance);
    assert_eq!(pod.distance_info(), None);
}

#[test]
fn reset_meta_keeps_properties() {
    let pod = Pod::new(&toolbox(), PodKind::Document, "notes");
    pod.set_id("notes/1").unwrap();
    pod.set_revision("r1");
    pod.set("x", 1).unwrap();

    pod.reset_meta();
    assert_eq!(pod.id(), None);
    assert_eq!(pod.key(), None);
    assert_eq!(pod.revision(), None);
    assert_eq!(pod.get("x").unwrap(), Some(json!(1)));
    pod.set_id("notes/2").unwrap();
}

#[test]
fn reset_meta_makes_hydrated_pod_new_again() {
    let pod = Pod::new(&toolbox(), PodKind::Document, "notes");
    pod.load_from_wire(&record(json!({"_id": "notes/7", "_rev": "r3", "x": 1})))
        .unwrap();
    assert!(!pod.is_new());
    assert!(!pod.has_changed());

    pod.reset_meta();
    assert!(pod.is_new());
    assert!(pod.has_changed());
    assert_eq!(pod.collection(), "notes");
    assert!(!pod.to_driver_format().unwrap().contains_key(KEY));
}

#[test]
fn model_binds_once() {
    let toolbox = toolbox();
    let pod = Pod::new(&toolbox, PodKind::Document, "notes");
    let first = crate::model::constructor::<crate::model::GenericModel>();
    let second = crate::model::constructor::<crate::model::GenericModel>();

    pod.load_model(&first).unwrap();
    assert_eq!(pod.load_model(&second), Err(PodError::ModelAlreadyBound));
    assert!(Rc::ptr_eq(&pod.model().unwrap(), &first));

    drop(first);
    assert!(pod.model().is_none());
}

#[test]
fn coordinates_follow_geo_index() {
    let db = Rc::new(MemoryDatabase::new());
    db.ensure_geo_index("places", GeoFields::lat_lon("lat", "lon"));
    let toolbox = Toolbox::builder(ToolboxConfig::new("geo"))
        .database(db)
        .build()
        .unwrap();

    let place = Pod::new(&toolbox, PodKind::Document, "places");
    assert_eq!(place.coordinates().unwrap(), None);
    place.set("lat", 52.5).unwrap();
    place.set("lon", 13.4).unwrap();
    assert_eq!(place.coordinates().unwrap(), Some(Coordinates::new(52.5, 13.4)));

    let note = Pod::new(&toolbox, PodKind::Document, "notes");
    note.set("lat", 1.0).unwrap();
    assert_eq!(note.coordinates().unwrap(), None);
}

#[test]
fn near_excludes_self_and_references_it() {
    let db = Rc::new(MemoryDatabase::new());
    db.ensure_geo_index("places", GeoFields::location("at"));
    let toolbox = Toolbox::builder(ToolboxConfig::new("geo"))
        .database(db)
        .build()
        .unwrap();
    let pods = toolbox.pods();

    let mut stored = Vec::new();
    for at in [[0.0, 0.0], [0.0, 1.0], [0.0, 2.0]] {
        let model = pods.dispense("places").unwrap();
        model.pod().unwrap().set("at", json!(at)).unwrap();
        pods.store(&model).unwrap();
        stored.push(model);
    }

    let origin = stored[0].pod().unwrap();
    let near = origin.near(&Criteria::new(), 5).unwrap();
    assert_eq!(near.len(), 2);
    let closest = near[0].pod().unwrap();
    assert_eq!(closest.id(), stored[1].pod().unwrap().id());
    assert_eq!(closest.reference_id(), origin.id());
    assert!((closest.distance().unwrap() - 111_195.0).abs() < 100.0);

    let referenced = closest.reference_pod().unwrap().unwrap();
    assert_eq!(referenced.pod().unwrap().id(), origin.id());

    let within = origin.within(150_000.0, &Criteria::new()).unwrap();
    assert_eq!(within.len(), 1);

    let nowhere = pods.dispense("places").unwrap();
    let err = nowhere.pod().unwrap().near(&Criteria::new(), 1).unwrap_err();
    assert!(matches!(err, ToolboxError::Pod(PodError::NoCoordinates)));
}
