//! Query construction, translation and execution.
//!
//! A [`Query`] collects [`Filter`]s, a [`Condition`], an optional [`Sort`], a [`Limit`]
//! and an optional skip for one entity type. Running it translates that state into a
//! native query document, sends it to the store and decodes every returned document into
//! a fresh entity.
//!
//! # Translation
//!
//! Translation happens in two passes. The filters are first grouped into a [`QueryNode`]
//! tree, then a [`QueryVisitor`] renders the tree. [`NativeQueryRenderer`] produces the
//! document sent to the store:
//!
//! - under [`Condition::And`] every field becomes one top-level key. A lone equality is
//!   written as `{field: value}`; anything else is merged into one operator sub-document,
//!   so `age > 12` and `age < 40` become `{age: {$gt: 12, $lt: 40}}`. An equality next
//!   to other operators on the same field is kept as an explicit `$eq` entry.
//! - under [`Condition::Or`] every filter becomes one branch of `$or`.
//!
//! Two filters applying the same operator to the same field under `And` cannot both be
//! expressed and fail with [`DocumentStoreError::QueryConflict`].
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! let mut query = Query::<User>::new();
//! query
//!     .add_filter(Filter::gt("age", 12))
//!     .add_filter(Filter::lt("age", 40))
//!     .set_sort(Sort::ascending("name"))
//!     .set_limit(10);
//!
//! let users = query.get_all(&store).await?;
//! ```

use bson::{Bson, Document, doc};
use std::{fmt, marker::PhantomData};
use tracing::debug;

use crate::{
    backend::{FindOptions, StoreBackend},
    document::{EntityId, ID_ALIAS, ID_FIELD, is_reserved},
    entity::{Entity, EntityExt, store_failure},
    error::{DocumentStoreError, DocumentStoreResult, Operation},
    filter::{Condition, Filter, Limit, Operator, Sort},
    page::{Page, PaginationParams},
    store::DocumentStore,
};

/// Intermediate form of a query's filters, grouped per field.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryNode {
    /// A single equality on a field.
    Equals { field: String, value: Bson },
    /// One or more operator bounds that must all hold for a field.
    Range { field: String, bounds: Vec<(Operator, Bson)> },
    /// Every child must match.
    And(Vec<QueryNode>),
    /// At least one child must match.
    Or(Vec<QueryNode>),
}

/// Walks a [`QueryNode`] tree to produce some output.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, nodes: &[QueryNode]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, nodes: &[QueryNode]) -> Result<Self::Output, Self::Error>;
    fn visit_equals(&mut self, field: &str, value: &Bson) -> Result<Self::Output, Self::Error>;
    fn visit_range(
        &mut self,
        field: &str,
        bounds: &[(Operator, Bson)],
    ) -> Result<Self::Output, Self::Error>;

    fn visit_node(&mut self, node: &QueryNode) -> Result<Self::Output, Self::Error> {
        match node {
            QueryNode::And(nodes) => self.visit_and(nodes),
            QueryNode::Or(nodes) => self.visit_or(nodes),
            QueryNode::Equals { field, value } => self.visit_equals(field, value),
            QueryNode::Range { field, bounds } => self.visit_range(field, bounds),
        }
    }
}

/// Renders a [`QueryNode`] tree as a MongoDB-dialect query document.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeQueryRenderer;

impl QueryVisitor for NativeQueryRenderer {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, nodes: &[QueryNode]) -> DocumentStoreResult<Document> {
        let mut document = Document::new();

        for node in nodes {
            for (key, value) in self.visit_node(node)? {
                if document.contains_key(&key) {
                    return Err(DocumentStoreError::InvalidQuery(format!(
                        "field {key} appears more than once in a conjunction"
                    )));
                }
                document.insert(key, value);
            }
        }

        Ok(document)
    }

    fn visit_or(&mut self, nodes: &[QueryNode]) -> DocumentStoreResult<Document> {
        if nodes.is_empty() {
            return Ok(Document::new());
        }

        let branches = nodes
            .iter()
            .map(|node| self.visit_node(node).map(Bson::Document))
            .collect::<DocumentStoreResult<Vec<_>>>()?;

        let mut document = Document::new();
        document.insert("$or", branches);

        Ok(document)
    }

    fn visit_equals(&mut self, field: &str, value: &Bson) -> DocumentStoreResult<Document> {
        let mut document = Document::new();

        // A document value with `$` keys would otherwise be read as operators.
        match value {
            Bson::Document(inner) if inner.keys().any(|key| key.starts_with('$')) => {
                document.insert(field, doc! { "$eq": value.clone() });
            }
            _ => {
                document.insert(field, value.clone());
            }
        }

        Ok(document)
    }

    fn visit_range(&mut self, field: &str, bounds: &[(Operator, Bson)]) -> DocumentStoreResult<Document> {
        let operators = bounds
            .iter()
            .map(|(op, value)| (op.symbol().to_string(), value.clone()))
            .collect::<Document>();

        let mut document = Document::new();
        document.insert(field, operators);

        Ok(document)
    }
}

/// Renders a [`QueryNode`] tree as a readable expression, e.g. `(name = "Alice" OR age > 12)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryDescriber;

impl QueryDescriber {
    fn join(&mut self, nodes: &[QueryNode], separator: &str) -> DocumentStoreResult<String> {
        match nodes {
            [] => Ok("*".to_string()),
            [node] => self.visit_node(node),
            nodes => {
                let parts = nodes
                    .iter()
                    .map(|node| self.visit_node(node))
                    .collect::<DocumentStoreResult<Vec<_>>>()?;
                Ok(format!("({})", parts.join(separator)))
            }
        }
    }
}

impl QueryVisitor for QueryDescriber {
    type Output = String;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, nodes: &[QueryNode]) -> DocumentStoreResult<String> {
        self.join(nodes, " AND ")
    }

    fn visit_or(&mut self, nodes: &[QueryNode]) -> DocumentStoreResult<String> {
        self.join(nodes, " OR ")
    }

    fn visit_equals(&mut self, field: &str, value: &Bson) -> DocumentStoreResult<String> {
        Ok(format!("{field} = {value}"))
    }

    fn visit_range(&mut self, field: &str, bounds: &[(Operator, Bson)]) -> DocumentStoreResult<String> {
        Ok(bounds
            .iter()
            .map(|(op, value)| format!("{field} {} {value}", op.infix()))
            .collect::<Vec<_>>()
            .join(" AND "))
    }
}

/// The native form of a query: the filter document plus cursor modifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedQuery {
    pub filter: Document,
    pub options: FindOptions,
}

fn native_field(key: &str) -> &str {
    if key == ID_ALIAS { ID_FIELD } else { key }
}

/// A query over the collection of entity type `E`.
///
/// Setters take `&mut self` and return `&mut Self` so they can be chained. Translation
/// reads the state at call time; running a query never changes it.
pub struct Query<E: Entity> {
    filters: Vec<Filter>,
    condition: Condition,
    sort: Option<Sort>,
    limit: Limit,
    skip: Option<usize>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Query<E> {
    /// Creates an empty `And` query with no limit.
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            condition: Condition::default(),
            sort: None,
            limit: Limit::default(),
            skip: None,
            _entity: PhantomData,
        }
    }

    pub fn with_condition(condition: Condition) -> Self {
        let mut query = Self::new();
        query.condition = condition;
        query
    }

    /// Returns the name of the collection this query runs against.
    pub fn collection_name(&self) -> &'static str {
        E::collection_name()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn condition(&self) -> Condition {
        self.condition
    }

    pub fn sort(&self) -> Option<&Sort> {
        self.sort.as_ref()
    }

    pub fn limit(&self) -> Limit {
        self.limit
    }

    pub fn skip(&self) -> Option<usize> {
        self.skip
    }

    /// Appends a filter. Filters keep their insertion order.
    pub fn add_filter(&mut self, filter: Filter) -> &mut Self {
        self.filters.push(filter);
        self
    }

    pub fn set_condition(&mut self, condition: Condition) -> &mut Self {
        self.condition = condition;
        self
    }

    pub fn set_sort(&mut self, sort: Sort) -> &mut Self {
        self.sort = Some(sort);
        self
    }

    pub fn clear_sort(&mut self) -> &mut Self {
        self.sort = None;
        self
    }

    /// Caps the number of results; `0` removes the cap.
    pub fn set_limit(&mut self, limit: usize) -> &mut Self {
        self.limit = Limit::new(limit);
        self
    }

    pub fn clear_limit(&mut self) -> &mut Self {
        self.limit = Limit::Unlimited;
        self
    }

    /// Skips the first `skip` matching documents.
    pub fn set_skip(&mut self, skip: usize) -> &mut Self {
        self.skip = (skip > 0).then_some(skip);
        self
    }

    fn check_field(&self, key: &str) -> DocumentStoreResult<()> {
        if key.is_empty() || key.starts_with('$') {
            return Err(DocumentStoreError::InvalidQuery(format!("invalid field name '{key}'")));
        }

        let schema = E::schema();
        let root = key.split('.').next().unwrap_or(key);
        if !schema.is_empty() && !is_reserved(root) && !schema.contains(&root) {
            return Err(DocumentStoreError::InvalidQuery(format!(
                "{key} is not a field of {}",
                self.collection_name()
            )));
        }

        Ok(())
    }

    /// Groups the filters into a [`QueryNode`] tree.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::InvalidQuery`] if a filter or sort key is malformed or not
    ///   part of the entity's schema
    /// - [`DocumentStoreError::QueryConflict`] if two `And` filters apply the same operator
    ///   to the same field
    pub fn build_tree(&self) -> DocumentStoreResult<QueryNode> {
        for filter in &self.filters {
            self.check_field(filter.key())?;
        }
        if let Some(sort) = &self.sort {
            self.check_field(&sort.key)?;
        }

        match self.condition {
            Condition::Or => Ok(QueryNode::Or(
                self.filters
                    .iter()
                    .map(|filter| {
                        let field = native_field(filter.key()).to_string();
                        match filter.operator() {
                            Operator::Equals => QueryNode::Equals { field, value: filter.value().clone() },
                            op => QueryNode::Range { field, bounds: vec![(op, filter.value().clone())] },
                        }
                    })
                    .collect(),
            )),
            Condition::And => {
                let mut fields: Vec<(String, Vec<(Operator, Bson)>)> = Vec::new();

                for filter in &self.filters {
                    let field = native_field(filter.key());
                    let index = match fields.iter().position(|(f, _)| f == field) {
                        Some(index) => index,
                        None => {
                            fields.push((field.to_string(), Vec::new()));
                            fields.len() - 1
                        }
                    };

                    let bounds = &mut fields[index].1;
                    if bounds.iter().any(|(op, _)| *op == filter.operator()) {
                        return Err(DocumentStoreError::QueryConflict {
                            field: filter.key().to_string(),
                            operator: filter.operator(),
                        });
                    }
                    bounds.push((filter.operator(), filter.value().clone()));
                }

                Ok(QueryNode::And(
                    fields
                        .into_iter()
                        .map(|(field, mut bounds)| {
                            if matches!(bounds.as_slice(), [(Operator::Equals, _)]) {
                                let (_, value) = bounds.remove(0);
                                QueryNode::Equals { field, value }
                            } else {
                                QueryNode::Range { field, bounds }
                            }
                        })
                        .collect(),
                ))
            }
        }
    }

    fn find_options(&self) -> FindOptions {
        FindOptions {
            limit: self.limit.count(),
            skip: self.skip,
            sort: self
                .sort
                .as_ref()
                .map(|sort| Sort::new(native_field(&sort.key), sort.direction)),
        }
    }

    /// Translates the current state into a native query document and cursor modifiers.
    ///
    /// # Errors
    ///
    /// See [`build_tree`](Self::build_tree).
    pub fn translate(&self) -> DocumentStoreResult<TranslatedQuery> {
        let tree = self.build_tree()?;

        Ok(TranslatedQuery {
            filter: NativeQueryRenderer.visit_node(&tree)?,
            options: self.find_options(),
        })
    }

    async fn execute<B: StoreBackend>(
        &self,
        store: &DocumentStore<B>,
        options: FindOptions,
    ) -> DocumentStoreResult<Vec<E>> {
        let collection = self.collection_name();
        let tree = self.build_tree()?;
        let filter = NativeQueryRenderer.visit_node(&tree)?;
        let description = QueryDescriber.visit_node(&tree)?;

        debug!(
            collection,
            query = %description,
            filter = %filter,
            ?options,
            "running query"
        );

        let documents = store
            .collection(collection)
            .find(filter)
            .with_options(options)
            .collect()
            .await
            .map_err(|err| store_failure(err, Operation::Query, collection, None))?;

        documents.iter().map(E::from_document).collect()
    }

    /// Returns every matching entity.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::InvalidQuery`] or [`DocumentStoreError::QueryConflict`] if
    ///   the query cannot be translated
    /// - [`DocumentStoreError::Store`] if the find fails
    /// - [`DocumentStoreError::InvalidDocument`] if a returned document cannot be decoded
    pub async fn get_all<B: StoreBackend>(&self, store: &DocumentStore<B>) -> DocumentStoreResult<Vec<E>> {
        self.execute(store, self.find_options()).await
    }

    /// Returns the first matching entity, if any.
    ///
    /// Runs with a limit of one regardless of the configured limit, which is left as is.
    pub async fn get_first<B: StoreBackend>(&self, store: &DocumentStore<B>) -> DocumentStoreResult<Option<E>> {
        let options = FindOptions { limit: Some(1), ..self.find_options() };

        Ok(self.execute(store, options).await?.into_iter().next())
    }

    /// Counts the matching documents, ignoring limit, skip and sort.
    pub async fn count<B: StoreBackend>(&self, store: &DocumentStore<B>) -> DocumentStoreResult<u64> {
        let collection = self.collection_name();
        let tree = self.build_tree()?;
        let filter = NativeQueryRenderer.visit_node(&tree)?;

        store
            .collection(collection)
            .count(filter)
            .await
            .map_err(|err| store_failure(err, Operation::Query, collection, None))
    }

    /// Returns one page of matching entities.
    ///
    /// The page replaces the configured limit and skip; filters and sort still apply.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidQuery`] for page 0 or an empty page size, and
    /// otherwise the errors of [`get_all`](Self::get_all).
    pub async fn get_page<B: StoreBackend>(
        &self,
        store: &DocumentStore<B>,
        params: &PaginationParams,
    ) -> DocumentStoreResult<Page<E>> {
        params.validate()?;

        let count = self.count(store).await?;
        let options = FindOptions {
            limit: Some(params.per_page),
            skip: Some(params.offset()).filter(|skip| *skip > 0),
            ..self.find_options()
        };
        let items = self.execute(store, options).await?;

        Ok(params.page_of(items, count))
    }

    /// Loads the entity with the given identifier.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::NotFound`] if no document has this identifier.
    pub async fn get_for_id<B: StoreBackend>(store: &DocumentStore<B>, id: &EntityId) -> DocumentStoreResult<E> {
        let mut query = Self::new();
        query.add_filter(Filter::eq(ID_FIELD, *id));

        query.get_first(store).await?.ok_or_else(|| DocumentStoreError::NotFound {
            operation: Operation::Query,
            collection: E::collection_name().to_string(),
            id: *id,
        })
    }
}

impl<E: Entity> Default for Query<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            condition: self.condition,
            sort: self.sort.clone(),
            limit: self.limit,
            skip: self.skip,
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("collection", &self.collection_name())
            .field("filters", &self.filters)
            .field("condition", &self.condition)
            .field("sort", &self.sort)
            .field("limit", &self.limit)
            .field("skip", &self.skip)
            .finish()
    }
}

impl<E: Entity> fmt::Display for Query<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let described = self
            .build_tree()
            .and_then(|tree| QueryDescriber.visit_node(&tree));

        match described {
            Ok(described) => write!(f, "{}: {described}", self.collection_name()),
            Err(err) => write!(f, "{}: <{err}>", self.collection_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{entity::Record, filter::SortDirection};
    use bson::doc;

    #[derive(Debug, Default)]
    struct Person {
        record: Record,
    }

    impl Entity for Person {
        fn collection_name() -> &'static str {
            "person"
        }

        fn record(&self) -> &Record {
            &self.record
        }

        fn record_mut(&mut self) -> &mut Record {
            &mut self.record
        }
    }

    #[derive(Debug, Default)]
    struct Strict {
        record: Record,
    }

    impl Entity for Strict {
        fn collection_name() -> &'static str {
            "strict"
        }

        fn schema() -> &'static [&'static str] {
            &["name", "address"]
        }

        fn record(&self) -> &Record {
            &self.record
        }

        fn record_mut(&mut self) -> &mut Record {
            &mut self.record
        }
    }

    #[test]
    fn and_equality_uses_scalar_shorthand() {
        let mut query = Query::<Person>::new();
        query.add_filter(Filter::eq("name", "Alice"));

        assert_eq!(query.translate().unwrap().filter, doc! { "name": "Alice" });
    }

    #[test]
    fn and_ranges_on_one_field_merge() {
        let mut query = Query::<Person>::new();
        query
            .add_filter(Filter::gt("age", 12))
            .add_filter(Filter::lt("age", 40))
            .add_filter(Filter::eq("name", "Alice"));

        assert_eq!(
            query.translate().unwrap().filter,
            doc! { "age": { "$gt": 12, "$lt": 40 }, "name": "Alice" }
        );
    }

    #[test]
    fn or_wraps_each_filter_as_a_branch() {
        let mut query = Query::<Person>::with_condition(Condition::Or);
        query
            .add_filter(Filter::eq("name", "Alice"))
            .add_filter(Filter::gt("age", 12));

        assert_eq!(
            query.translate().unwrap().filter,
            doc! { "$or": [ { "name": "Alice" }, { "age": { "$gt": 12 } } ] }
        );
    }

    #[test]
    fn empty_queries_match_everything() {
        assert_eq!(Query::<Person>::new().translate().unwrap().filter, doc! {});
        assert_eq!(
            Query::<Person>::with_condition(Condition::Or).translate().unwrap().filter,
            doc! {}
        );
    }

    #[test]
    fn equality_next_to_range_keeps_both_constraints() {
        let mut query = Query::<Person>::new();
        query
            .add_filter(Filter::lt("age", 40))
            .add_filter(Filter::eq("age", 20));

        assert_eq!(
            query.translate().unwrap().filter,
            doc! { "age": { "$lt": 40, "$eq": 20 } }
        );
    }

    #[test]
    fn repeated_operator_on_a_field_is_a_conflict() {
        let mut query = Query::<Person>::new();
        query
            .add_filter(Filter::eq("name", "Alice"))
            .add_filter(Filter::eq("name", "Bob"));

        let err = query.translate().unwrap_err();
        assert!(matches!(
            err,
            DocumentStoreError::QueryConflict { ref field, operator: Operator::Equals } if field == "name"
        ));

        // The same pair is fine as alternatives.
        query.set_condition(Condition::Or);
        assert!(query.translate().is_ok());
    }

    #[test]
    fn id_alias_targets_the_identifier_field() {
        let id = EntityId::new();
        let mut query = Query::<Person>::new();
        query.add_filter(Filter::eq("id", id)).set_sort(Sort::descending("id"));

        let translated = query.translate().unwrap();
        assert_eq!(translated.filter, doc! { "_id": id });
        assert_eq!(translated.options.sort, Some(Sort::new("_id", SortDirection::Descending)));
    }

    #[test]
    fn cursor_modifiers_follow_limit_skip_and_sort() {
        let mut query = Query::<Person>::new();
        assert_eq!(query.translate().unwrap().options, FindOptions::default());

        query.set_limit(5).set_skip(10).set_sort(Sort::ascending("name"));
        let options = query.translate().unwrap().options;
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.skip, Some(10));
        assert_eq!(options.sort_document(), Some(doc! { "name": 1 }));

        query.set_limit(0);
        assert_eq!(query.translate().unwrap().options.limit, None);
    }

    #[test]
    fn schema_rejects_unknown_fields() {
        let mut query = Query::<Strict>::new();
        query
            .add_filter(Filter::eq("name", "Alice"))
            .add_filter(Filter::eq("address.city", "Oslo"))
            .add_filter(Filter::gte("createdAt", 0_i64));
        assert!(query.translate().is_ok());

        query.add_filter(Filter::eq("nickname", "Al"));
        assert!(matches!(query.translate(), Err(DocumentStoreError::InvalidQuery(_))));

        let mut sorted = Query::<Strict>::new();
        sorted.set_sort(Sort::ascending("age"));
        assert!(matches!(sorted.translate(), Err(DocumentStoreError::InvalidQuery(_))));
    }

    #[test]
    fn operator_keys_are_not_field_names() {
        let mut query = Query::<Person>::new();
        query.add_filter(Filter::eq("$where", "1"));

        assert!(matches!(query.translate(), Err(DocumentStoreError::InvalidQuery(_))));
    }

    #[test]
    fn operator_shaped_values_compare_literally() {
        let mut query = Query::<Person>::new();
        query.add_filter(Filter::eq("meta", doc! { "$gt": 5 }));

        assert_eq!(
            query.translate().unwrap().filter,
            doc! { "meta": { "$eq": { "$gt": 5 } } }
        );

        let mut plain = Query::<Person>::new();
        plain.add_filter(Filter::eq("meta", doc! { "views": 5 }));

        assert_eq!(plain.translate().unwrap().filter, doc! { "meta": { "views": 5 } });
    }

    #[test]
    fn describer_reads_like_an_expression() {
        let mut query = Query::<Person>::with_condition(Condition::Or);
        query
            .add_filter(Filter::eq("name", "Alice"))
            .add_filter(Filter::gte("age", 18));

        assert_eq!(query.to_string(), "person: (name = \"Alice\" OR age >= 18)");
        assert_eq!(Query::<Person>::new().to_string(), "person: *");
    }
}
