//! Lazy, composable query descriptors.
//!
//! A [`Criteria`] is an immutable value naming a target class plus a cumulative selector
//! and a cumulative option set. Every producer (`refine`, `filter`, `sort`, `scope`, ...)
//! returns a new criteria and never touches storage; only the terminal operations
//! (`all`, `first`, `iter`, `count`, `paginate`, `raw`) issue a query, and they issue it
//! afresh every time they are called.
//!
//! # Merge semantics
//!
//! Merging is shallow and key-wise, with the last write winning:
//!
//! - a key present in the new selector replaces the same key in the old one, keys absent
//!   from the new selector are kept;
//! - options follow the same rule per option key, so a later `sort` or `limit` replaces
//!   an earlier one entirely. Nested documents are never merged.
//!
//! ```ignore
//! let criteria = mapper
//!     .criteria("Shape")?
//!     .refine(doc! { "radius": 1 }, doc! {})
//!     .refine(doc! {}, doc! { "sort": [["color", "asc"]] });
//!
//! assert_eq!(criteria.selector(), &doc! { "radius": 1 });
//! assert_eq!(criteria.options(), &doc! { "sort": [["color", "asc"]] });
//! ```
//!
//! # Scopes
//!
//! Classes expose named scopes, which are finders receiving a criteria and returning a
//! refined one. They compose under the same merge rules:
//!
//! ```ignore
//! let big_red = mapper
//!     .criteria("Shape")?
//!     .scope("red", &[])?
//!     .scope("larger_than", &[Bson::Double(2.0)])?;
//! ```

use bson::{Bson, Document, doc};
use std::{fmt, sync::Arc, vec};

use crate::{
    backend::Namespace,
    class::MappedClass,
    error::{DocMapError, DocMapResult},
    instance::{DISCRIMINATOR_KEY, Instance},
    mapper::DocumentMapper,
    page::Page,
    registry::Registry,
    resolver::Instantiator,
};

/// An immutable query descriptor bound to a mapper and a target class.
#[derive(Clone)]
pub struct Criteria<'a> {
    mapper: &'a DocumentMapper,
    class: Arc<MappedClass>,
    selector: Document,
    options: Document,
}

impl<'a> Criteria<'a> {
    pub(crate) fn new(mapper: &'a DocumentMapper, class: Arc<MappedClass>) -> Self {
        Self {
            mapper,
            class,
            selector: Document::new(),
            options: Document::new(),
        }
    }

    /// Returns a new criteria with `selector` and `options` merged in, last write wins.
    pub fn refine(mut self, selector: Document, options: Document) -> Self {
        for (key, value) in selector {
            self.selector.insert(key, value);
        }
        for (key, value) in options {
            self.options.insert(key, value);
        }

        self
    }

    /// Merges selector entries.
    pub fn filter(self, selector: Document) -> Self {
        self.refine(selector, Document::new())
    }

    /// Replaces the sort option.
    ///
    /// Accepts either a `{ field: 1 | -1 }` document or an array of `[field, direction]`
    /// pairs.
    pub fn sort(self, spec: impl Into<Bson>) -> Self {
        let spec: Bson = spec.into();

        self.refine(Document::new(), doc! { "sort": spec })
    }

    /// Replaces the limit option. Values past `i64::MAX` are clamped to it.
    pub fn limit(self, limit: u64) -> Self {
        self.refine(Document::new(), doc! { "limit": clamped(limit) })
    }

    /// Replaces the skip option. Values past `i64::MAX` are clamped to it.
    pub fn skip(self, skip: u64) -> Self {
        self.refine(Document::new(), doc! { "skip": clamped(skip) })
    }

    /// Merges another criteria's selector and options into this one.
    pub fn merge(self, other: &Criteria<'_>) -> Self {
        self.refine(other.selector.clone(), other.options.clone())
    }

    /// Applies a named scope of the target class.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::UnknownScope`] if the class has no scope with that name,
    /// and whatever error the scope itself reports.
    pub fn scope(self, name: &str, args: &[Bson]) -> DocMapResult<Self> {
        let scope = self
            .class
            .scope(name)
            .cloned()
            .ok_or_else(|| DocMapError::UnknownScope {
                class: self.class.name().to_string(),
                scope: name.to_string(),
            })?;

        scope(self, args)
    }

    pub fn selector(&self) -> &Document {
        &self.selector
    }

    pub fn options(&self) -> &Document {
        &self.options
    }

    pub fn class(&self) -> &Arc<MappedClass> {
        &self.class
    }

    pub fn namespace(&self) -> Namespace {
        self.class.binding().namespace()
    }

    pub fn mapper(&self) -> &'a DocumentMapper {
        self.mapper
    }

    /// Executes the query and returns the raw stored documents.
    pub async fn raw(&self) -> DocMapResult<Vec<Document>> {
        let (backend, namespace) = self.mapper.backend_for(self.class.binding())?;
        let selector = self.execution_selector();

        log::debug!(
            "Querying {} for {}: selector={} options={}",
            namespace,
            self.class.name(),
            selector,
            self.options
        );

        backend
            .find_documents(selector, self.options.clone(), &namespace)
            .await
    }

    /// Executes the query and instantiates every result.
    pub async fn all(&self) -> DocMapResult<Vec<Instance>> {
        self.iter().await?.collect()
    }

    /// Executes the query with a limit of one and instantiates the result, if any.
    pub async fn first(&self) -> DocMapResult<Option<Instance>> {
        self.clone().limit(1).iter().await?.next().transpose()
    }

    /// Executes the query, returning a cursor over its results.
    ///
    /// The driver result is fetched in full before this returns. Only instantiation is
    /// deferred: each raw document becomes an [`Instance`] when the cursor yields it.
    pub async fn iter(&self) -> DocMapResult<InstanceCursor<'a>> {
        let documents = self.raw().await?;

        Ok(InstanceCursor {
            registry: self.mapper.registry(),
            class: self.class.clone(),
            documents: documents.into_iter(),
        })
    }

    /// Counts matching documents. Options are ignored.
    pub async fn count(&self) -> DocMapResult<u64> {
        let (backend, namespace) = self.mapper.backend_for(self.class.binding())?;
        let selector = self.execution_selector();

        log::debug!("Counting {} in {}: selector={}", self.class.name(), namespace, selector);

        backend
            .count_documents(selector, &namespace)
            .await
    }

    /// Executes one page of the query.
    ///
    /// # Errors
    ///
    /// Returns [`DocMapError::InvalidArgument`] if `page` or `per_page` is zero, or if the
    /// page starts past the largest offset a driver accepts.
    pub async fn paginate(&self, page: u64, per_page: u64) -> DocMapResult<Page<Instance>> {
        if page == 0 || per_page == 0 {
            return Err(DocMapError::InvalidArgument(format!(
                "page {} of size {} (pages are 1-indexed and non-empty)",
                page, per_page
            )));
        }

        let offset = (page - 1)
            .checked_mul(per_page)
            .filter(|offset| i64::try_from(*offset).is_ok())
            .ok_or_else(|| DocMapError::InvalidArgument(format!(
                "page {} of size {} is out of range",
                page, per_page
            )))?;

        let total = self.count().await?;
        let items = self
            .clone()
            .skip(offset)
            .limit(per_page)
            .all()
            .await?;

        Ok(Page::new(items, total, page, per_page))
    }

    /// The selector sent to the driver.
    ///
    /// Reads through a subclass only match documents discriminated as that subclass or
    /// one of its descendants, unless the selector already constrains the discriminator.
    fn execution_selector(&self) -> Document {
        let mut selector = self.selector.clone();

        if !self.class.is_root() && !selector.contains_key(DISCRIMINATOR_KEY) {
            let discriminators: Vec<Bson> = self
                .mapper
                .registry()
                .descendants(self.class.name())
                .into_iter()
                .map(|class| Bson::String(class.discriminator().to_string()))
                .collect();

            selector.insert(DISCRIMINATOR_KEY, doc! { "$in": discriminators });
        }

        selector
    }
}

impl fmt::Debug for Criteria<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Criteria")
            .field("class", &self.class.name())
            .field("selector", &self.selector)
            .field("options", &self.options)
            .finish()
    }
}

fn clamped(value: u64) -> Bson {
    Bson::Int64(i64::try_from(value).unwrap_or(i64::MAX))
}

/// Instantiates the documents of an executed query one at a time.
pub struct InstanceCursor<'a> {
    registry: &'a Registry,
    class: Arc<MappedClass>,
    documents: vec::IntoIter<Document>,
}

impl InstanceCursor<'_> {
    /// The number of documents not yet pulled.
    pub fn remaining(&self) -> usize {
        self.documents.len()
    }
}

impl Iterator for InstanceCursor<'_> {
    type Item = DocMapResult<Instance>;

    fn next(&mut self) -> Option<Self::Item> {
        let document = self.documents.next()?;

        Some(Instantiator::new(self.registry).instantiate(&document, &self.class))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.documents.size_hint()
    }
}

impl fmt::Debug for InstanceCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceCursor")
            .field("class", &self.class.name())
            .field("remaining", &self.documents.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bson::Uuid;
    use std::sync::Mutex;

    use crate::{
        backend::StoreBackend,
        class::{ClassDef, IndexSpec},
        field::FieldType,
    };

    /// Records the selectors it is queried with and returns canned documents.
    #[derive(Debug, Default)]
    struct RecordingBackend {
        documents: Vec<Document>,
        queries: Arc<Mutex<Vec<(Document, Document)>>>,
    }

    #[async_trait]
    impl StoreBackend for RecordingBackend {
        async fn insert_documents(&self, _: Vec<(Uuid, Document)>, _: &Namespace) -> DocMapResult<()> {
            Ok(())
        }

        async fn update_documents(&self, _: Vec<(Uuid, Document)>, _: &Namespace) -> DocMapResult<()> {
            Ok(())
        }

        async fn delete_documents(&self, _: Vec<Uuid>, _: &Namespace) -> DocMapResult<()> {
            Ok(())
        }

        async fn get_documents(&self, _: Vec<Uuid>, _: &Namespace) -> DocMapResult<Vec<Document>> {
            Ok(Vec::new())
        }

        async fn find_documents(
            &self,
            selector: Document,
            options: Document,
            _: &Namespace,
        ) -> DocMapResult<Vec<Document>> {
            self.queries.lock().unwrap().push((selector, options));
            Ok(self.documents.clone())
        }

        async fn count_documents(&self, _: Document, _: &Namespace) -> DocMapResult<u64> {
            Ok(self.documents.len() as u64)
        }

        async fn create_index(&self, _: &Namespace, _: &IndexSpec) -> DocMapResult<()> {
            Ok(())
        }

        async fn drop_collection(&self, _: &Namespace) -> DocMapResult<()> {
            Ok(())
        }
    }

    fn mapper(documents: Vec<Document>) -> (DocumentMapper, Arc<Mutex<Vec<(Document, Document)>>>) {
        let registry = Registry::builder()
            .define(
                ClassDef::new("Shape")
                    .field("color", FieldType::String)
                    .scope("red", |criteria, _| Ok(criteria.filter(doc! { "color": "red" })))
                    .scope("larger_than", |criteria, args| {
                        let radius = args
                            .first()
                            .cloned()
                            .ok_or_else(|| DocMapError::InvalidArgument("radius".to_string()))?;

                        Ok(criteria.filter(doc! { "radius": { "$gt": radius } }))
                    })
                    .scope("big_red", |criteria, _| {
                        criteria.scope("red", &[])?.scope("larger_than", &[Bson::Double(5.0)])
                    }),
            )
            .unwrap()
            .define(ClassDef::new("Circle").extends("Shape").field("radius", FieldType::Float))
            .unwrap()
            .define(ClassDef::new("Ring").extends("Circle"))
            .unwrap()
            .build();

        let backend = RecordingBackend {
            documents,
            ..Default::default()
        };
        let queries = backend.queries.clone();
        let mapper = DocumentMapper::builder(registry)
            .backend(backend)
            .build()
            .unwrap();

        (mapper, queries)
    }

    #[test]
    fn test_merge_law() {
        let (mapper, _) = mapper(Vec::new());
        let criteria = mapper
            .criteria("Shape")
            .unwrap()
            .refine(doc! { "radius": 1 }, doc! {})
            .refine(doc! {}, doc! { "sort": [["color", "asc"]] });

        assert_eq!(criteria.selector(), &doc! { "radius": 1 });
        assert_eq!(criteria.options(), &doc! { "sort": [["color", "asc"]] });
    }

    #[test]
    fn test_last_write_wins_without_deep_merge() {
        let (mapper, _) = mapper(Vec::new());
        let criteria = mapper
            .criteria("Shape")
            .unwrap()
            .filter(doc! { "color": "red", "radius": { "$gt": 1 } })
            .sort(doc! { "color": 1 })
            .limit(10)
            .filter(doc! { "radius": { "$lt": 5 } })
            .sort(doc! { "radius": -1 });

        assert_eq!(
            criteria.selector(),
            &doc! { "color": "red", "radius": { "$lt": 5 } }
        );
        assert_eq!(
            criteria.options(),
            &doc! { "sort": { "radius": -1 }, "limit": 10_i64 }
        );
    }

    #[test]
    fn test_refining_leaves_the_original_untouched() {
        let (mapper, _) = mapper(Vec::new());
        let base = mapper.criteria("Shape").unwrap().filter(doc! { "color": "red" });
        let refined = base.clone().filter(doc! { "color": "blue" });

        assert_eq!(base.selector(), &doc! { "color": "red" });
        assert_eq!(refined.selector(), &doc! { "color": "blue" });
    }

    #[test]
    fn test_merge_combines_two_criteria() {
        let (mapper, _) = mapper(Vec::new());
        let left = mapper.criteria("Shape").unwrap().filter(doc! { "a": 1, "b": 1 }).limit(5);
        let right = mapper.criteria("Shape").unwrap().filter(doc! { "b": 2 }).skip(3);

        let merged = left.merge(&right);

        assert_eq!(merged.selector(), &doc! { "a": 1, "b": 2 });
        assert_eq!(merged.options(), &doc! { "limit": 5_i64, "skip": 3_i64 });
    }

    #[test]
    fn test_scopes_compose() {
        let (mapper, _) = mapper(Vec::new());
        let criteria = mapper
            .criteria("Circle")
            .unwrap()
            .scope("big_red", &[])
            .unwrap();

        assert_eq!(
            criteria.selector(),
            &doc! { "color": "red", "radius": { "$gt": 5.0 } }
        );
        assert!(matches!(
            mapper.criteria("Shape").unwrap().scope("missing", &[]),
            Err(DocMapError::UnknownScope { .. })
        ));
    }

    #[tokio::test]
    async fn test_execution_is_lazy_and_repeatable() {
        let (mapper, queries) = mapper(vec![doc! { "_type": "Shape", "color": "red" }]);
        let criteria = mapper.criteria("Shape").unwrap().filter(doc! { "color": "red" });

        assert!(queries.lock().unwrap().is_empty());

        let first = criteria.all().await.unwrap();
        let second = criteria.all().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(queries.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_subclass_reads_are_scoped_to_their_lineage() {
        let (mapper, queries) = mapper(Vec::new());

        mapper.criteria("Circle").unwrap().all().await.unwrap();
        mapper
            .criteria("Circle")
            .unwrap()
            .filter(doc! { "_type": "Ring" })
            .all()
            .await
            .unwrap();
        mapper.criteria("Shape").unwrap().all().await.unwrap();

        let queries = queries.lock().unwrap();

        assert_eq!(queries[0].0, doc! { "_type": { "$in": ["Circle", "Ring"] } });
        assert_eq!(queries[1].0, doc! { "_type": "Ring" });
        assert_eq!(queries[2].0, doc! {});
    }

    #[tokio::test]
    async fn test_first_replaces_limit() {
        let (mapper, queries) = mapper(vec![doc! { "_type": "Shape" }, doc! { "_type": "Shape" }]);

        let first = mapper.criteria("Shape").unwrap().limit(50).first().await.unwrap();

        assert!(first.is_some());
        assert_eq!(queries.lock().unwrap()[0].1, doc! { "limit": 1_i64 });
    }

    #[tokio::test]
    async fn test_cursor_instantiates_lazily() {
        let (mapper, _) = mapper(vec![
            doc! { "_type": "Circle", "radius": 1.0 },
            doc! { "_type": "Unknown" },
        ]);

        let mut cursor = mapper.criteria("Shape").unwrap().iter().await.unwrap();

        assert_eq!(cursor.remaining(), 2);
        assert_eq!(cursor.next().unwrap().unwrap().class_name(), "Circle");
        assert!(matches!(cursor.next(), Some(Err(DocMapError::Resolution { .. }))));
        assert!(cursor.next().is_none());
    }

    #[tokio::test]
    async fn test_paginate_rejects_page_zero() {
        let (mapper, _) = mapper(Vec::new());

        assert!(matches!(
            mapper.criteria("Shape").unwrap().paginate(0, 10).await,
            Err(DocMapError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_paginate_rejects_offsets_out_of_range() {
        let (mapper, queries) = mapper(Vec::new());
        let criteria = mapper.criteria("Shape").unwrap();

        assert!(matches!(
            criteria.paginate(u64::MAX, u64::MAX).await,
            Err(DocMapError::InvalidArgument(_))
        ));
        assert!(matches!(
            criteria.paginate(3, u64::MAX / 2).await,
            Err(DocMapError::InvalidArgument(_))
        ));
        assert!(queries.lock().unwrap().is_empty());
    }

    #[test]
    fn test_oversized_limit_and_skip_are_clamped() {
        let (mapper, _) = mapper(Vec::new());
        let criteria = mapper.criteria("Shape").unwrap().limit(u64::MAX).skip(7);

        assert_eq!(criteria.options(), &doc! { "limit": i64::MAX, "skip": 7_i64 });
        assert_eq!(
            criteria.skip(u64::MAX).options().get("skip"),
            Some(&Bson::Int64(i64::MAX))
        );
    }
}
