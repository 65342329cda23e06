//! MongoDB-backed document store.
//!
//! Uses the driver's blocking API: the recorder performs one synchronous
//! round-trip per write and returns control to the host afterwards.

use chrono::{DateTime, Utc};
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, Credential, IndexOptions, ServerAddress};
use mongodb::sync::{Client, Collection, Database};
use mongodb::IndexModel;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{index_name, DocumentStore, INDEXES};
use crate::config::{Backend, StoreConfig};
use crate::error::{Error, Result};
use crate::types::{BuildQuery, BuildRecord, BuilderRecord, StepRecord, BUILDERS, BUILDS, STEPS};

/// Server error codes the recorder reacts to.
const UNAUTHORIZED: i32 = 13;
const AUTHENTICATION_FAILED: i32 = 18;
const NAMESPACE_NOT_FOUND: i32 = 26;
const DUPLICATE_KEY: i32 = 11000;

/// Timestamp fields stored as BSON dates.
const DATE_FIELDS: &[&str] = &["time_start", "time_end"];

/// Document store on a MongoDB database.
pub struct MongoStore {
    // Keeps the connection pool alive for `db`.
    _client: Client,
    db: Database,
    name: String,
}

impl MongoStore {
    /// Build a client for `config.host:config.port`.
    ///
    /// The driver connects lazily; credentials are checked by
    /// [`DocumentStore::authenticate`].
    pub fn connect(config: &StoreConfig) -> Result<Self> {
        let mut options = ClientOptions::default();
        options.hosts = vec![ServerAddress::Tcp {
            host: config.host.clone(),
            port: Some(config.port),
        }];
        options.app_name = Some("bbstatus".to_string());

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            let mut credential = Credential::default();
            credential.username = Some(username.clone());
            credential.password = Some(password.clone());
            credential.source = Some(config.database.clone());
            options.credential = Some(credential);
        }

        let client = Client::with_options(options)?;
        let db = client.database(&config.database);
        debug!(address = %config.address(), database = %config.database, "mongo client created");

        Ok(Self {
            _client: client,
            db,
            name: config.database.clone(),
        })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }

    fn insert<T: Serialize>(&self, collection: &str, id: &str, value: &T) -> Result<()> {
        match self.collection(collection).insert_one(to_document(value)?).run() {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(Error::DuplicateDocument {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(Error::Mongo(e)),
        }
    }

    fn upsert<T: Serialize>(&self, collection: &str, id: &str, value: &T) -> Result<()> {
        self.collection(collection)
            .replace_one(doc! { "_id": id }, to_document(value)?)
            .upsert(true)
            .run()?;
        Ok(())
    }

    fn find_one<T: DeserializeOwned>(&self, collection: &str, filter: Document) -> Result<Option<T>> {
        self.collection(collection)
            .find_one(filter)
            .run()?
            .map(from_document)
            .transpose()
    }

    fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        self.find_one(collection, doc! { "_id": id })
    }

    fn find<T: DeserializeOwned>(
        &self,
        collection: &str,
        filter: Document,
        sort: Document,
        limit: Option<usize>,
    ) -> Result<Vec<T>> {
        let coll = self.collection(collection);
        let mut action = coll.find(filter).sort(sort);
        if let Some(limit) = limit {
            action = action.limit(limit as i64);
        }

        let mut found = Vec::new();
        for doc in action.run()? {
            found.push(from_document(doc?)?);
        }
        Ok(found)
    }

    /// Index names already present on `collection`.
    fn index_names(&self, collection: &str) -> Result<Vec<String>> {
        match self.collection(collection).list_index_names().run() {
            Ok(names) => Ok(names),
            Err(e) if command_code(&e) == Some(NAMESPACE_NOT_FOUND) => Ok(Vec::new()),
            Err(e) => Err(Error::Mongo(e)),
        }
    }
}

/// Serialize a record, turning its RFC 3339 timestamps into BSON dates.
fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    let mut doc = bson::to_document(value).map_err(|e| Error::Bson(e.to_string()))?;
    for field in DATE_FIELDS {
        let converted = match doc.get(*field) {
            Some(Bson::String(text)) => {
                let parsed = DateTime::parse_from_rfc3339(text)
                    .map_err(|e| Error::Bson(format!("{}: {}", field, e)))?;
                Some(bson::DateTime::from_millis(parsed.timestamp_millis()))
            }
            _ => None,
        };
        if let Some(date) = converted {
            doc.insert(*field, Bson::DateTime(date));
        }
    }
    Ok(doc)
}

/// Inverse of [`to_document`].
fn from_document<T: DeserializeOwned>(mut doc: Document) -> Result<T> {
    for field in DATE_FIELDS {
        let converted = match doc.get(*field) {
            Some(Bson::DateTime(date)) => {
                let time = DateTime::<Utc>::from_timestamp_millis(date.timestamp_millis())
                    .ok_or_else(|| Error::Bson(format!("{}: date out of range", field)))?;
                Some(time.to_rfc3339())
            }
            _ => None,
        };
        if let Some(text) = converted {
            doc.insert(*field, Bson::String(text));
        }
    }
    bson::from_document(doc).map_err(|e| Error::Bson(e.to_string()))
}

impl DocumentStore for MongoStore {
    fn backend(&self) -> Backend {
        Backend::Mongo
    }

    fn authenticate(&self) -> Result<()> {
        match self.db.run_command(doc! { "ping": 1 }).run() {
            Ok(_) => Ok(()),
            Err(e) if is_auth_failure(&e) => Err(Error::authentication(&self.name, e.to_string())),
            Err(e) => Err(Error::Mongo(e)),
        }
    }

    fn ensure_indexes(&self) -> Result<usize> {
        let mut created = 0;

        for (collection, fields) in INDEXES {
            let existing = self.index_names(collection)?;
            for field in *fields {
                let name = index_name(collection, field);
                if existing.contains(&name) {
                    continue;
                }

                let mut keys = Document::new();
                keys.insert(*field, 1);
                let model = IndexModel::builder()
                    .keys(keys)
                    .options(IndexOptions::builder().name(name.clone()).build())
                    .build();
                self.collection(collection)
                    .create_index(model)
                    .run()?;
                debug!(index = %name, "created index");
                created += 1;
            }
        }

        Ok(created)
    }

    fn find_builder(&self, name: &str, master_id: Option<&str>) -> Result<Option<BuilderRecord>> {
        self.find_one(BUILDERS, doc! { "name": name, "master_id": master_id })
    }

    fn save_builder(&self, builder: &BuilderRecord) -> Result<()> {
        self.upsert(BUILDERS, &builder.id, builder)
    }

    fn list_builders(&self, master_id: Option<&str>) -> Result<Vec<BuilderRecord>> {
        self.find(BUILDERS, doc! { "master_id": master_id }, doc! { "name": 1 }, None)
    }

    fn insert_build(&self, build: &BuildRecord) -> Result<()> {
        self.insert(BUILDS, &build.id, build)
    }

    fn save_build(&self, build: &BuildRecord) -> Result<()> {
        self.upsert(BUILDS, &build.id, build)
    }

    fn get_build(&self, id: &str) -> Result<Option<BuildRecord>> {
        self.get(BUILDS, id)
    }

    fn recent_builds(&self, query: &BuildQuery) -> Result<Vec<BuildRecord>> {
        let builds = self.find(
            BUILDS,
            build_filter(query),
            doc! { "time_start": -1, "number": -1 },
            query.limit,
        )?;
        Ok(newest_first(builds))
    }

    fn insert_step(&self, step: &StepRecord) -> Result<()> {
        self.insert(STEPS, &step.id, step)
    }

    fn save_step(&self, step: &StepRecord) -> Result<()> {
        self.upsert(STEPS, &step.id, step)
    }

    fn get_step(&self, id: &str) -> Result<Option<StepRecord>> {
        self.get(STEPS, id)
    }

    fn steps_for_build(&self, build_id: &str) -> Result<Vec<StepRecord>> {
        self.find(STEPS, doc! { "build": build_id }, doc! { "time_start": 1 }, None)
    }
}

/// Translate a [`BuildQuery`] into a find filter.
fn build_filter(query: &BuildQuery) -> Document {
    let mut filter = Document::new();
    if let Some(builder) = &query.builder {
        filter.insert("builder", builder.as_str());
    }
    if let Some(worker) = &query.worker {
        filter.insert("workers", worker.as_str());
    }
    match query.finished {
        Some(true) => {
            filter.insert("time_end", doc! { "$ne": null });
        }
        Some(false) => {
            filter.insert("time_end", mongodb::bson::Bson::Null);
        }
        None => {}
    }
    filter
}

fn newest_first(mut builds: Vec<BuildRecord>) -> Vec<BuildRecord> {
    builds.sort_by(|a, b| {
        b.time_start
            .cmp(&a.time_start)
            .then_with(|| b.number.cmp(&a.number))
    });
    builds
}

fn command_code(e: &mongodb::error::Error) -> Option<i32> {
    match &*e.kind {
        ErrorKind::Command(command) => Some(command.code),
        _ => None,
    }
}

fn is_auth_failure(e: &mongodb::error::Error) -> bool {
    matches!(&*e.kind, ErrorKind::Authentication { .. }) || command_code(e).is_some_and(is_auth_code)
}

fn is_auth_code(code: i32) -> bool {
    matches!(code, UNAUTHORIZED | AUTHENTICATION_FAILED)
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    matches!(
        &*e.kind,
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_build_filter_empty_query() {
        assert!(build_filter(&BuildQuery::default()).is_empty());
    }

    #[test]
    fn test_build_filter_fields() {
        let filter = build_filter(&BuildQuery {
            builder: Some("linux-x64".into()),
            worker: Some("w1".into()),
            finished: Some(false),
            limit: Some(10),
        });

        assert_eq!(filter.get_str("builder").unwrap(), "linux-x64");
        assert_eq!(filter.get_str("workers").unwrap(), "w1");
        assert_eq!(filter.get("time_end"), Some(&mongodb::bson::Bson::Null));
        assert!(!filter.contains_key("limit"));
    }

    #[test]
    fn test_build_filter_finished() {
        let filter = build_filter(&BuildQuery {
            finished: Some(true),
            ..Default::default()
        });
        let time_end = filter.get_document("time_end").unwrap();
        assert!(time_end.contains_key("$ne"));
    }

    #[test]
    fn test_newest_first_orders_by_start_then_number() {
        let now = Utc::now();
        let builds = vec![
            BuildRecord::new("linux-x64", vec![], 1, now),
            BuildRecord::new("linux-x64", vec![], 3, now + Duration::seconds(5)),
            BuildRecord::new("linux-x64", vec![], 2, now),
        ];

        let numbers: Vec<u64> = newest_first(builds).iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![3, 2, 1]);
    }

    #[test]
    fn test_timestamps_stored_as_dates() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut build = BuildRecord::new("linux-x64", vec!["w1".into()], 42, start);
        build.time_end = Some(start + Duration::milliseconds(1500));

        let doc = to_document(&build).unwrap();
        assert!(matches!(doc.get("time_start"), Some(Bson::DateTime(_))));
        assert!(matches!(doc.get("time_end"), Some(Bson::DateTime(_))));

        let loaded: BuildRecord = from_document(doc).unwrap();
        assert_eq!(loaded, build);
    }

    #[test]
    fn test_open_build_keeps_null_end() {
        let build = BuildRecord::new("linux-x64", vec![], 1, Utc::now());
        let doc = to_document(&build).unwrap();
        assert_eq!(doc.get("time_end"), Some(&Bson::Null));
    }

    #[test]
    fn test_dates_sort_within_a_second() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let earlier = to_document(&BuildRecord::new("a", vec![], 1, start)).unwrap();
        let later =
            to_document(&BuildRecord::new("a", vec![], 2, start + Duration::milliseconds(250))).unwrap();

        let millis = |doc: &Document| doc.get_datetime("time_start").unwrap().timestamp_millis();
        assert!(millis(&earlier) < millis(&later));
    }

    #[test]
    fn test_auth_error_codes() {
        assert!(is_auth_code(UNAUTHORIZED));
        assert!(is_auth_code(AUTHENTICATION_FAILED));
        assert!(!is_auth_code(DUPLICATE_KEY));
        assert!(!is_auth_code(NAMESPACE_NOT_FOUND));
    }

    #[test]
    fn test_connect_is_lazy() {
        // No server needed: the driver only resolves hosts on first use.
        let mut config = StoreConfig::new("ci");
        config.host = "127.0.0.1".into();
        config.port = 1;
        let store = MongoStore::connect(&config).expect("client creation should not touch the network");
        assert_eq!(store.backend(), Backend::Mongo);
    }
}
