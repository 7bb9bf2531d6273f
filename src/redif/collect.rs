use std::collections::{BTreeMap, HashMap};

use super::parse::Template;

/// Cluster prefixes and the attribute that opens a new entry.
const CLUSTERS: &[(&str, &str)] = &[
    ("author", "name"),
    ("editor", "name"),
    ("contact", "name"),
    ("publisher", "name"),
    ("provider", "name"),
    ("file", "url"),
];

/// A cluster entry, e.g. one author: `name`, `email`, `workplace-name`, ...
pub type Cluster = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(String),
    Compound(Cluster),
}

/// A collected template: field name to values in order of appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: HashMap<String, Vec<FieldValue>>,
    /// Index of the entry still being filled, per cluster prefix.
    open: HashMap<String, usize>,
}

impl Record {
    pub fn values(&self, name: &str) -> &[FieldValue] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Scalar values of a field, in order.
    pub fn scalars<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.values(name).iter().filter_map(|v| match v {
            FieldValue::Scalar(s) => Some(s.as_str()),
            FieldValue::Compound(_) => None,
        })
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.scalars(name).next()
    }

    /// Structured entries of a cluster, e.g. all authors.
    pub fn compounds<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Cluster> + 'a {
        self.values(name).iter().filter_map(|v| match v {
            FieldValue::Compound(c) => Some(c),
            FieldValue::Scalar(_) => None,
        })
    }

    fn push(&mut self, name: &str, value: FieldValue) {
        self.fields.entry(name.to_string()).or_default().push(value);
    }

    fn open_cluster(&mut self, prefix: &str) {
        let values = self.fields.entry(prefix.to_string()).or_default();
        values.push(FieldValue::Compound(Cluster::new()));
        self.open.insert(prefix.to_string(), values.len() - 1);
    }

    /// Entry still being filled for `prefix`. Scalars pushed under the same
    /// name in between do not close it.
    fn current_cluster(&mut self, prefix: &str) -> Option<&mut Cluster> {
        let index = *self.open.get(prefix)?;
        match self.fields.get_mut(prefix)?.get_mut(index)? {
            FieldValue::Compound(c) => Some(c),
            FieldValue::Scalar(_) => None,
        }
    }
}

pub fn collect(template: &Template) -> Record {
    let mut record = Record::default();
    for (name, value) in &template.pairs {
        record.push(name, FieldValue::Scalar(value.clone()));
        if let Some((prefix, head, attr)) = cluster_key(name) {
            add_to_cluster(&mut record, prefix, head, attr, value);
        }
    }
    record
}

fn cluster_key(name: &str) -> Option<(&'static str, &'static str, &str)> {
    let (prefix, attr) = name.split_once('-')?;
    if attr.is_empty() {
        return None;
    }
    CLUSTERS
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|&(p, head)| (p, head, attr))
}

fn add_to_cluster(record: &mut Record, prefix: &str, head: &str, attr: &str, value: &str) {
    let starts_new = attr == head
        || record
            .current_cluster(prefix)
            .map_or(true, |c| c.contains_key(attr));
    if starts_new {
        record.open_cluster(prefix);
    }
    if let Some(cluster) = record.current_cluster(prefix) {
        cluster.entry(attr.to_string()).or_default().push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(pairs: &[(&str, &str)]) -> Template {
        Template {
            pairs: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn repeated_scalars_keep_order() {
        let r = collect(&template(&[
            ("template-type", "ReDIF-Paper 1.0"),
            ("keywords", "one"),
            ("title", "T"),
            ("keywords", "two"),
            ("keywords", "three"),
        ]));
        let kw: Vec<_> = r.scalars("keywords").collect();
        assert_eq!(kw, vec!["one", "two", "three"]);
        assert_eq!(r.first("title"), Some("T"));
        assert_eq!(r.first("abstract"), None);
    }

    #[test]
    fn authors_with_optional_emails() {
        let r = collect(&template(&[
            ("template-type", "ReDIF-Paper 1.0"),
            ("author-name", "Smith, John"),
            ("author-email", "john@example.org"),
            ("author-name", "Doe, Jane"),
            ("author-name", "Roe, Richard"),
            ("author-email", "rr@example.org"),
        ]));
        let authors: Vec<_> = r.compounds("author").collect();
        assert_eq!(authors.len(), 3);
        assert_eq!(authors[0]["name"], vec!["Smith, John"]);
        assert_eq!(authors[0]["email"], vec!["john@example.org"]);
        assert!(!authors[1].contains_key("email"));
        assert_eq!(authors[2]["email"], vec!["rr@example.org"]);
        assert_eq!(r.scalars("author-name").count(), 3);
    }

    #[test]
    fn nested_attributes_stay_with_their_author() {
        let r = collect(&template(&[
            ("template-type", "ReDIF-Paper 1.0"),
            ("author-name", "Smith"),
            ("author-workplace-name", "University of Nowhere"),
            ("author-name", "Doe"),
        ]));
        let authors: Vec<_> = r.compounds("author").collect();
        assert_eq!(authors[0]["workplace-name"], vec!["University of Nowhere"]);
        assert_eq!(authors[1].len(), 1);
    }

    #[test]
    fn repeated_attribute_opens_new_entry() {
        let r = collect(&template(&[
            ("template-type", "ReDIF-Paper 1.0"),
            ("file-url", "http://a"),
            ("file-format", "application/pdf"),
            ("file-format", "text/html"),
        ]));
        assert_eq!(r.compounds("file").count(), 2);
    }

    #[test]
    fn literal_author_field_is_scalar() {
        let r = collect(&template(&[
            ("template-type", "ReDIF-Paper 1.0"),
            ("author", "Someone"),
            ("author-name", "Smith"),
        ]));
        assert_eq!(r.values("author").len(), 2);
        assert_eq!(r.first("author"), Some("Someone"));
        assert_eq!(r.compounds("author").count(), 1);
    }

    #[test]
    fn non_cluster_dashed_fields_are_plain() {
        let r = collect(&template(&[
            ("template-type", "ReDIF-Paper 1.0"),
            ("creation-date", "1998-05-01"),
            ("classification-jel", "G1"),
        ]));
        assert!(r.values("creation").is_empty());
        assert!(r.values("classification").is_empty());
        assert_eq!(r.first("creation-date"), Some("1998-05-01"));
    }

    #[test]
    fn bare_prefix_scalar_keeps_cluster_open() {
        let r = collect(&template(&[
            ("template-type", "ReDIF-Paper 1.0"),
            ("author-name", "Smith, Jane"),
            ("author", "stray"),
            ("author-email", "jane@example.org"),
        ]));
        let authors: Vec<_> = r.compounds("author").collect();
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0]["name"], vec!["Smith, Jane"]);
        assert_eq!(authors[0]["email"], vec!["jane@example.org"]);
        assert_eq!(r.first("author"), Some("stray"));
    }
}
