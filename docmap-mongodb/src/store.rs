use async_trait::async_trait;
use futures::{stream::iter, StreamExt, TryStreamExt};
use bson::{Document, Bson, Uuid, doc};
use mongodb::{
    Client, Collection as MongoCollection, IndexModel,
    options::{ClientOptions, FindOptions, IndexOptions},
};
use docmap_core::{
    backend::{Namespace, StoreBackend, StoreBackendBuilder},
    class::IndexSpec,
    error::{DocMapError, DocMapResult},
};


#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    /// Returns the collection a namespace addresses; namespaces without a database
    /// live in the store's default database.
    fn get_collection(&self, namespace: &Namespace) -> MongoCollection<Document> {
        self.client
            .database(namespace.database.as_deref().unwrap_or(&self.database))
            .collection(&namespace.collection)
    }

    fn prepare_document(id: &Uuid, document: Document) -> Document {
        let mut prepared = doc! { "_id": *id };

        for (key, value) in document {
            if key != "_id" {
                prepared.insert(key, value);
            }
        }

        prepared
    }
}

/// Translates the `sort`, `skip` and `limit` query options into driver options.
///
/// `sort` may be a `{ field: 1 | -1 }` document, passed through as is, or an array of
/// `[field, direction]` pairs where direction is `"asc"`, `"desc"`, `1` or `-1`.
pub(crate) fn find_options(options: &Document) -> DocMapResult<FindOptions> {
    let mut find_options = FindOptions::default();

    if let Some(sort) = options.get("sort") {
        find_options.sort = Some(sort_document(sort)?);
    }
    if let Some(limit) = options.get("limit") {
        find_options.limit = Some(integer_option("limit", limit)?);
    }
    if let Some(skip) = options.get("skip") {
        find_options.skip = Some(
            u64::try_from(integer_option("skip", skip)?)
                .map_err(|_| DocMapError::InvalidDocument(format!("negative skip option {}", skip)))?,
        );
    }

    Ok(find_options)
}

fn sort_document(sort: &Bson) -> DocMapResult<Document> {
    let invalid = || DocMapError::InvalidDocument(format!("invalid sort specification {}", sort));

    match sort {
        Bson::Document(spec) => Ok(spec.clone()),
        Bson::Array(pairs) => pairs
            .iter()
            .map(|pair| match pair.as_array().map(Vec::as_slice) {
                Some([Bson::String(field), direction]) => {
                    let direction = match direction {
                        Bson::String(dir) if dir.eq_ignore_ascii_case("asc") => 1,
                        Bson::String(dir) if dir.eq_ignore_ascii_case("desc") => -1,
                        Bson::Int32(dir @ (1 | -1)) => *dir,
                        Bson::Int64(dir @ (1 | -1)) => *dir as i32,
                        _ => return Err(invalid()),
                    };

                    Ok((field.clone(), Bson::Int32(direction)))
                }
                Some([Bson::String(field)]) => Ok((field.clone(), Bson::Int32(1))),
                _ => Err(invalid()),
            })
            .collect(),
        _ => Err(invalid()),
    }
}

fn integer_option(key: &str, value: &Bson) -> DocMapResult<i64> {
    match value {
        Bson::Int32(value) => Ok(*value as i64),
        Bson::Int64(value) => Ok(*value),
        _ => Err(DocMapError::InvalidDocument(format!("invalid {} option {}", key, value))),
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_documents(&self, documents: Vec<(Uuid, Document)>, namespace: &Namespace) -> DocMapResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let ids = documents
            .iter()
            .map(|(id, _)| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        self.get_collection(namespace)
            .insert_many(
                documents
                    .into_iter()
                    .map(|(id, doc)| Self::prepare_document(&id, doc))
                    .collect::<Vec<Document>>(),
            )
            .await
            .map_err(|e| {
                let message = e.to_string();

                // E11000: duplicate key
                if message.contains("E11000") {
                    DocMapError::DocumentAlreadyExists(ids, namespace.to_string())
                } else {
                    DocMapError::Backend(message)
                }
            })?;

        Ok(())
    }

    async fn update_documents(&self, documents: Vec<(Uuid, Document)>, namespace: &Namespace) -> DocMapResult<()> {
        let collection = self.get_collection(namespace);

        iter(documents)
            .then(async |(id, doc)| collection
                .replace_one(doc! { "_id": id }, Self::prepare_document(&id, doc))
                .upsert(true)
                .await
                .map_err(|e| DocMapError::Backend(e.to_string()))
            )
            .try_collect::<Vec<_>>()
            .await?;

        Ok(())
    }

    async fn delete_documents(&self, ids: Vec<Uuid>, namespace: &Namespace) -> DocMapResult<()> {
        self.get_collection(namespace)
            .delete_many(doc! { "_id": { "$in": ids } })
            .await
            .map_err(|e| DocMapError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn get_documents(&self, ids: Vec<Uuid>, namespace: &Namespace) -> DocMapResult<Vec<Document>> {
        log::debug!("Fetching {} document(s) from {}", ids.len(), namespace);

        self.get_collection(namespace)
            .find(doc! { "_id": { "$in": ids } })
            .await
            .map_err(|e| DocMapError::Backend(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| DocMapError::Backend(e.to_string()))
    }

    async fn find_documents(
        &self,
        selector: Document,
        options: Document,
        namespace: &Namespace,
    ) -> DocMapResult<Vec<Document>> {
        self.get_collection(namespace)
            .find(selector)
            .with_options(find_options(&options)?)
            .await
            .map_err(|e| DocMapError::Backend(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| DocMapError::Backend(e.to_string()))
    }

    async fn count_documents(&self, selector: Document, namespace: &Namespace) -> DocMapResult<u64> {
        self.get_collection(namespace)
            .count_documents(selector)
            .await
            .map_err(|e| DocMapError::Backend(e.to_string()))
    }

    async fn create_index(&self, namespace: &Namespace, index: &IndexSpec) -> DocMapResult<()> {
        self.get_collection(namespace)
            .create_index(
                IndexModel::builder()
                .keys(index.keys_document())
                .options(
                    IndexOptions::builder()
                    .name(index.name().to_string())
                    .unique(index.is_unique())
                    .build()
                )
                .build()
            )
            .await
            .map_err(|e| DocMapError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn drop_collection(&self, namespace: &Namespace) -> DocMapResult<()> {
        self.get_collection(namespace)
            .drop()
            .await
            .map_err(|e| DocMapError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn shutdown(self) -> DocMapResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocMapResult<Self::Backend> {
        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| DocMapError::Initialization(e.to_string()))?,
            )
            .map_err(|e| DocMapError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
