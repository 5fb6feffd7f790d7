use bson::{Bson, Uuid, doc};
use docmap::{memory::InMemoryStore, prelude::*};
use indexmap::IndexMap;
use std::sync::Arc;

#[ctor::ctor]
fn init() {
    colog::init();
}

#[derive(Debug, Clone, PartialEq)]
struct Point {
    x: f64,
    y: f64,
}

impl Embeddable for Point {
    fn to_storage(&self) -> Bson {
        Bson::Array(vec![self.x.into(), self.y.into()])
    }

    fn cast_from_storage(raw: &Bson) -> Option<Self> {
        match raw.as_array()?.as_slice() {
            [Bson::Double(x), Bson::Double(y)] => Some(Point { x: *x, y: *y }),
            _ => None,
        }
    }
}

fn registry() -> DocMapResult<Arc<Registry>> {
    Ok(Registry::builder()
        .define(ClassDef::new("Color").field("name", FieldType::String))?
        .define(
            ClassDef::new("Shape")
                .field("color", FieldType::Reference)
                .field_with_default("label", FieldType::String, "untitled")
                .field_with("tags", FieldType::array_of(FieldType::String), || Value::Array(Vec::new()))
                .field("sides", FieldType::Integer)
                .index(IndexSpec::new("by_label").key("label"))
                .scope("labelled", |criteria, args| {
                    let label = args
                        .first()
                        .cloned()
                        .ok_or_else(|| DocMapError::InvalidArgument("labelled expects a label".to_string()))?;

                    Ok(criteria.filter(doc! { "label": label }))
                })
                .scope("by_size", |criteria, _| Ok(criteria.sort(doc! { "radius": 1 }))),
        )?
        .define(ClassDef::new("Circle").extends("Shape").field("radius", FieldType::Float))?
        .define(ClassDef::new("Ring").extends("Circle").field("inner", FieldType::Float))?
        .define(ClassDef::new("Marker").field("at", FieldType::embedded::<Point>()))?
        .define(ClassDef::new("Drawing").field("shape", FieldType::model("Shape")))?
        .define(ClassDef::new("Cat").collection("pets").field("name", FieldType::String))?
        .define(ClassDef::new("Dog").collection("pets").field("name", FieldType::String))?
        .define(
            ClassDef::new("Audit")
                .bind(CollectionBinding::full("archive", "history", "audits"))
                .field("message", FieldType::String),
        )?
        .build())
}

fn mapper_with(store: &InMemoryStore) -> DocumentMapper {
    DocumentMapper::builder(registry().unwrap())
        .backend(store.clone())
        .connection("archive", InMemoryStore::new())
        .build()
        .unwrap()
}

async fn create(mapper: &DocumentMapper, class: &str, fields: Vec<(&str, Value)>) -> Instance {
    let mut instance = mapper.new_instance(class).unwrap();

    for (name, value) in fields {
        instance.set(name, value).unwrap();
    }

    mapper.save(&mut instance).await.unwrap();
    instance
}

#[tokio::test]
async fn test_save_find_update_and_remove() {
    let store = InMemoryStore::new();
    let mapper = mapper_with(&store);

    let mut circle = create(&mapper, "Circle", vec![("radius", 2.into())]).await;
    let id = circle.id().unwrap();

    assert!(!circle.is_new());
    assert_eq!(circle.get("radius"), Some(&Value::Float(2.0)));

    let found = mapper.find("Shape", id).await.unwrap().unwrap();
    assert_eq!(found, circle);
    assert_eq!(found.get("label"), Some(&Value::String("untitled".to_string())));

    circle.set("label", "wheel").unwrap();
    mapper.save(&mut circle).await.unwrap();

    assert_eq!(circle.id(), Some(id));
    assert_eq!(store.len(&Namespace::new("shapes")).await, 1);
    assert_eq!(
        mapper.find("Circle", id).await.unwrap().unwrap().get("label"),
        Some(&Value::String("wheel".to_string()))
    );

    mapper.remove(&circle).await.unwrap();

    assert!(mapper.find("Shape", id).await.unwrap().is_none());
    assert!(mapper.find("Shape", Uuid::new()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_polymorphic_reads_restore_subclasses() {
    let store = InMemoryStore::new();
    let mapper = mapper_with(&store);

    create(&mapper, "Shape", vec![("sides", 4.into())]).await;
    create(&mapper, "Circle", vec![("radius", 1.5.into())]).await;
    create(&mapper, "Ring", vec![("radius", 3.into()), ("inner", 1.into())]).await;

    let mut shapes: Vec<String> = mapper
        .criteria("Shape")
        .unwrap()
        .all()
        .await
        .unwrap()
        .iter()
        .map(|shape| shape.class_name().to_string())
        .collect();
    shapes.sort();

    assert_eq!(shapes, vec!["Circle", "Ring", "Shape"]);

    let circles = mapper.criteria("Circle").unwrap().all().await.unwrap();

    assert_eq!(circles.len(), 2);
    assert!(circles.iter().all(|circle| circle.class_name() != "Shape"));
    assert_eq!(mapper.criteria("Ring").unwrap().count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_unrelated_discriminator_fails_resolution() {
    let store = InMemoryStore::new();
    let mapper = mapper_with(&store);
    let id = Uuid::new();

    StoreBackend::insert_documents(
        &store,
        vec![(id, doc! { "_id": id, "_type": "Color", "name": "teal" })],
        &Namespace::new("shapes"),
    )
    .await
    .unwrap();

    assert!(matches!(
        mapper.criteria("Shape").unwrap().all().await,
        Err(DocMapError::Resolution { .. })
    ));
    assert!(matches!(
        mapper.find("Shape", id).await,
        Err(DocMapError::Resolution { .. })
    ));
}

#[tokio::test]
async fn test_raw_documents_keep_undeclared_attributes() {
    let store = InMemoryStore::new();
    let mapper = mapper_with(&store);
    let id = Uuid::new();

    StoreBackend::insert_documents(
        &store,
        vec![(id, doc! { "_id": id, "sides": 3, "legacy": "kept" })],
        &Namespace::new("shapes"),
    )
    .await
    .unwrap();

    let mut shape = mapper.find("Shape", id).await.unwrap().unwrap();

    assert_eq!(shape.class_name(), "Shape");
    assert_eq!(shape.attribute("legacy"), Some(&Bson::String("kept".to_string())));

    mapper.save(&mut shape).await.unwrap();

    let stored = StoreBackend::get_documents(&store, vec![id], &Namespace::new("shapes"))
        .await
        .unwrap();

    assert_eq!(stored[0].get_str("legacy").unwrap(), "kept");
    assert_eq!(stored[0].get_str("_type").unwrap(), "Shape");
}

#[tokio::test]
async fn test_criteria_merge_is_last_write_wins() {
    let store = InMemoryStore::new();
    let mapper = mapper_with(&store);

    let stepwise = mapper
        .criteria("Shape")
        .unwrap()
        .refine(doc! { "sides": 3, "label": "a" }, doc! { "sort": { "sides": 1 }, "limit": 5 })
        .refine(doc! { "label": "b" }, doc! { "sort": { "label": -1 } });
    let combined = mapper
        .criteria("Shape")
        .unwrap()
        .refine(doc! { "sides": 3, "label": "b" }, doc! { "sort": { "label": -1 }, "limit": 5 });

    assert_eq!(stepwise.selector(), combined.selector());
    assert_eq!(stepwise.options(), combined.options());

    let merged = mapper
        .criteria("Shape")
        .unwrap()
        .filter(doc! { "sides": 4 })
        .merge(&stepwise);

    assert_eq!(merged.selector(), &doc! { "sides": 3, "label": "b" });
}

#[tokio::test]
async fn test_criteria_execute_afresh_every_time() {
    let store = InMemoryStore::new();
    let mapper = mapper_with(&store);

    create(&mapper, "Shape", vec![("sides", 3.into())]).await;

    let triangles = mapper.criteria("Shape").unwrap().filter(doc! { "sides": 3 });

    assert_eq!(triangles.all().await.unwrap().len(), 1);
    assert_eq!(triangles.all().await.unwrap().len(), 1);

    create(&mapper, "Shape", vec![("sides", 3.into())]).await;

    assert_eq!(triangles.all().await.unwrap().len(), 2);
    assert_eq!(triangles.count().await.unwrap(), 2);
    assert!(triangles.first().await.unwrap().is_some());
}

#[tokio::test]
async fn test_scopes_compose() {
    let store = InMemoryStore::new();
    let mapper = mapper_with(&store);

    create(&mapper, "Circle", vec![("label", "wheel".into()), ("radius", 3.into())]).await;
    create(&mapper, "Circle", vec![("label", "wheel".into()), ("radius", 1.into())]).await;
    create(&mapper, "Circle", vec![("label", "coin".into()), ("radius", 2.into())]).await;

    let wheels = mapper
        .scope("Shape", "labelled", &[Bson::String("wheel".to_string())])
        .unwrap()
        .scope("by_size", &[])
        .unwrap()
        .all()
        .await
        .unwrap();

    let radii: Vec<&Value> = wheels.iter().filter_map(|wheel| wheel.get("radius")).collect();
    assert_eq!(radii, vec![&Value::Float(1.0), &Value::Float(3.0)]);

    assert!(matches!(
        mapper.scope("Shape", "labelled", &[]),
        Err(DocMapError::InvalidArgument(_))
    ));
    assert!(matches!(
        mapper.scope("Shape", "missing", &[]),
        Err(DocMapError::UnknownScope { .. })
    ));
}

#[tokio::test]
async fn test_references_resolve_in_one_lookup_per_collection() {
    let store = InMemoryStore::new();
    let mapper = mapper_with(&store);

    let red = create(&mapper, "Color", vec![("name", "red".into())]).await;
    let blue = create(&mapper, "Color", vec![("name", "blue".into())]).await;
    let green = create(&mapper, "Color", vec![("name", "green".into())]).await;
    let circle = create(&mapper, "Circle", vec![("radius", 1.into())]).await;
    let square = create(&mapper, "Shape", vec![("sides", 4.into())]).await;

    let value = Value::Array(vec![
        red.to_reference().unwrap().into(),
        blue.to_reference().unwrap().into(),
        green.to_reference().unwrap().into(),
        circle.to_reference().unwrap().into(),
        square.to_reference().unwrap().into(),
    ]);

    store.reset_lookup_count();
    let resolved = mapper.resolve(&value).await.unwrap();

    assert_eq!(store.lookup_count(), 2);

    let items = resolved.as_array().unwrap();
    assert_eq!(items.len(), 5);
    assert_eq!(items[0].as_instance(), Some(&red));
    assert_eq!(items[2].as_instance().unwrap().get("name"), Some(&Value::String("green".to_string())));
    assert_eq!(items[3].as_instance().unwrap().class_name(), "Circle");
    assert_eq!(items[4].as_instance(), Some(&square));
}

#[tokio::test]
async fn test_nested_references_keep_their_shape() {
    let store = InMemoryStore::new();
    let mapper = mapper_with(&store);

    let red = create(&mapper, "Color", vec![("name", "red".into())]).await;
    let circle = create(&mapper, "Circle", vec![("radius", 1.into())]).await;

    let value = Value::Map(IndexMap::from([
        ("a".to_string(), red.to_reference().unwrap().into()),
        (
            "b".to_string(),
            Value::Array(vec![
                Value::Map(IndexMap::from([(
                    "c".to_string(),
                    circle.to_reference().unwrap().into(),
                )])),
                Value::Integer(7),
            ]),
        ),
    ]));

    store.reset_lookup_count();
    let resolved = mapper.resolve(&value).await.unwrap();

    assert_eq!(store.lookup_count(), 2);

    let entries = resolved.as_map().unwrap();
    assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(entries["a"].as_instance(), Some(&red));

    let items = entries["b"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_map().unwrap()["c"].as_instance(), Some(&circle));
    assert_eq!(items[1], Value::Integer(7));
}

#[tokio::test]
async fn test_unrelated_classes_sharing_a_collection_resolve_together() {
    let store = InMemoryStore::new();
    let mapper = mapper_with(&store);

    let cat = create(&mapper, "Cat", vec![("name", "tom".into())]).await;
    let dog = create(&mapper, "Dog", vec![("name", "rex".into())]).await;
    let value = Value::Array(vec![
        cat.to_reference().unwrap().into(),
        dog.to_reference().unwrap().into(),
    ]);

    store.reset_lookup_count();
    let resolved = mapper.resolve(&value).await.unwrap();
    let items = resolved.as_array().unwrap();

    assert_eq!(store.lookup_count(), 1);
    assert_eq!(items[0].as_instance(), Some(&cat));
    assert_eq!(items[1].as_instance(), Some(&dog));
}

#[tokio::test]
async fn test_model_fields_only_accept_their_lineage() {
    let store = InMemoryStore::new();
    let mapper = mapper_with(&store);

    let color = mapper.new_instance("Color").unwrap();
    let mut circle = mapper.new_instance("Circle").unwrap();
    circle.set("radius", 2).unwrap();

    let mut drawing = mapper.new_instance("Drawing").unwrap();

    assert!(matches!(drawing.set("shape", color), Err(DocMapError::TypeCast { .. })));

    drawing.set("shape", circle.clone()).unwrap();
    mapper.save(&mut drawing).await.unwrap();

    let found = mapper.find("Drawing", drawing.id().unwrap()).await.unwrap().unwrap();
    assert_eq!(found.get("shape").and_then(Value::as_instance), Some(&circle));
}

#[tokio::test]
async fn test_dangling_references_resolve_to_null() {
    let store = InMemoryStore::new();
    let mapper = mapper_with(&store);

    let red = create(&mapper, "Color", vec![("name", "red".into())]).await;
    let value = Value::Array(vec![
        Reference::new("colors", Uuid::new()).into(),
        red.to_reference().unwrap().into(),
        Value::Integer(7),
    ]);

    let resolved = mapper.resolve(&value).await.unwrap();
    let items = resolved.as_array().unwrap();

    assert_eq!(items[0], Value::Null);
    assert_eq!(items[1].as_instance(), Some(&red));
    assert_eq!(items[2], Value::Integer(7));
}

#[tokio::test]
async fn test_reference_fields_store_links_and_resolve() {
    let store = InMemoryStore::new();
    let mapper = mapper_with(&store);

    let red = create(&mapper, "Color", vec![("name", "red".into())]).await;
    let shape = create(&mapper, "Shape", vec![("color", red.clone().into())]).await;

    assert_eq!(shape.get("color"), Some(&Value::Reference(red.to_reference().unwrap())));

    let stored = StoreBackend::get_documents(&store, vec![shape.id().unwrap()], &Namespace::new("shapes"))
        .await
        .unwrap();
    assert_eq!(
        stored[0].get_document("color").unwrap(),
        &doc! { "$ref": "colors", "$id": red.id().unwrap() }
    );

    let reloaded = mapper.find("Shape", shape.id().unwrap()).await.unwrap().unwrap();
    let color = mapper.resolve_field(&reloaded, "color").await.unwrap();

    assert_eq!(color.as_instance(), Some(&red));
    assert_eq!(mapper.resolve_field(&reloaded, "sides").await.unwrap(), Value::Null);
    assert!(matches!(
        mapper.resolve_field(&reloaded, "nope").await,
        Err(DocMapError::UnknownField { .. })
    ));
}

#[tokio::test]
async fn test_defaults_are_not_shared_between_instances() {
    let store = InMemoryStore::new();
    let mapper = mapper_with(&store);

    let mut first = mapper.new_instance("Shape").unwrap();
    let second = mapper.new_instance("Shape").unwrap();

    first
        .get_mut("tags")
        .and_then(Value::as_array_mut)
        .unwrap()
        .push(Value::String("mutated".to_string()));

    assert_eq!(second.get("tags"), Some(&Value::Array(Vec::new())));
    assert_eq!(mapper.new_instance("Shape").unwrap().get("tags"), Some(&Value::Array(Vec::new())));
    assert_eq!(first.get("label"), second.get("label"));
}

#[tokio::test]
async fn test_paginate() {
    let store = InMemoryStore::new();
    let mapper = mapper_with(&store);

    for radius in 1..=5 {
        create(&mapper, "Circle", vec![("radius", radius.into())]).await;
    }

    let by_size = mapper.scope("Circle", "by_size", &[]).unwrap();
    let page = by_size.paginate(2, 2).await.unwrap();

    assert_eq!(page.total, 5);
    assert_eq!(page.total_pages(), 3);
    assert_eq!(page.next_page, Some(3));
    assert_eq!(page.previous_page, Some(1));
    assert_eq!(
        page.items.iter().filter_map(|circle| circle.get("radius")).collect::<Vec<_>>(),
        vec![&Value::Float(3.0), &Value::Float(4.0)]
    );

    let last = by_size.paginate(3, 2).await.unwrap();

    assert_eq!(last.items.len(), 1);
    assert_eq!(last.next_page, None);
}

#[tokio::test]
async fn test_named_connections_route_storage() {
    let store = InMemoryStore::new();
    let archive = InMemoryStore::new();
    let mapper = DocumentMapper::builder(registry().unwrap())
        .backend(store.clone())
        .connection("archive", archive.clone())
        .build()
        .unwrap();

    let audit = create(&mapper, "Audit", vec![("message", "created".into())]).await;
    let namespace = Namespace::in_database("history", "audits");

    assert_eq!(archive.len(&namespace).await, 1);
    assert_eq!(store.len(&namespace).await, 0);
    assert_eq!(mapper.find("Audit", audit.id().unwrap()).await.unwrap(), Some(audit));

    assert!(matches!(
        DocumentMapper::builder(registry().unwrap()).backend(InMemoryStore::new()).build(),
        Err(DocMapError::Initialization(_))
    ));
}

#[tokio::test]
async fn test_ensure_indexes() {
    let store = InMemoryStore::new();
    let mapper = mapper_with(&store);

    mapper.ensure_indexes("Shape").await.unwrap();

    let indexes = store.indexes(&Namespace::new("shapes")).await;

    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].name(), "by_label");
    assert_eq!(indexes[0].keys_document(), doc! { "label": 1 });
}

#[tokio::test]
async fn test_embedded_values_round_trip() {
    let store = InMemoryStore::new();
    let mapper = mapper_with(&store);

    let marker = create(&mapper, "Marker", vec![("at", Value::embedded(Point { x: 1.0, y: 2.5 }))]).await;

    let stored = StoreBackend::get_documents(&store, vec![marker.id().unwrap()], &Namespace::new("markers"))
        .await
        .unwrap();
    assert_eq!(stored[0].get_array("at").unwrap(), &vec![Bson::Double(1.0), Bson::Double(2.5)]);

    let found = mapper.find("Marker", marker.id().unwrap()).await.unwrap().unwrap();

    assert_eq!(
        found.get("at").and_then(Value::as_embedded::<Point>),
        Some(&Point { x: 1.0, y: 2.5 })
    );

    let mut invalid = mapper.new_instance("Marker").unwrap();
    assert!(matches!(invalid.set("at", "north"), Err(DocMapError::TypeCast { .. })));
}
