use sqlx::{Postgres, QueryBuilder};

pub(crate) const SELECT_TUNES: &str = "
    select id, book_number, reference_number, title, type, meter, key_signature,
           abc_notation, file_path, created_at
    from tunes";

/// Criteria for [`crate::Database::search`]. Unset fields match everything;
/// text fields are case-insensitive substring matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TuneFilter {
    pub book_number: Option<i32>,
    pub tune_type: Option<String>,
    pub title: Option<String>,
    pub key_signature: Option<String>,
    pub limit: Option<i64>,
}

impl TuneFilter {
    pub(crate) fn select_query(&self) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(SELECT_TUNES);
        let mut joiner = " where ";

        if let Some(book_number) = self.book_number {
            builder
                .push(joiner)
                .push("book_number = ")
                .push_bind(book_number);
            joiner = " and ";
        }

        let substrings = [
            ("type", &self.tune_type),
            ("title", &self.title),
            ("key_signature", &self.key_signature),
        ];
        for (column, needle) in substrings {
            let Some(needle) = needle.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
                continue;
            };
            builder
                .push(joiner)
                .push(column)
                .push(" ilike ")
                .push_bind(contains_pattern(needle))
                .push(" escape '\\'");
            joiner = " and ";
        }

        builder.push(" order by book_number, id");
        if let Some(limit) = self.limit {
            builder.push(" limit ").push_bind(limit);
        }
        builder
    }
}

/// `%needle%` with LIKE wildcards in `needle` escaped.
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
