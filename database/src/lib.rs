use abc::TuneRecord;
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, instrument};

mod filter;
pub mod models;

pub use filter::TuneFilter;
use models::{BookCount, StoredTune, Summary, ValueCount};

/// Rows per insert statement; eight binds each keeps a statement well below
/// the postgres limit of 65535 parameters.
const INSERT_CHUNK_ROWS: usize = 1000;

pub struct Database {
    pool: sqlx::Pool<sqlx::Postgres>,
}

#[derive(Debug, Clone, Copy)]
enum Column {
    Type,
    KeySignature,
}

impl Column {
    fn as_sql(self) -> &'static str {
        match self {
            Column::Type => "type",
            Column::KeySignature => "key_signature",
        }
    }
}

impl Database {
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let pool = sqlx::PgPool::connect(url).await?;

        Ok(Self { pool })
    }

    #[instrument(skip(self), level = "trace")]
    pub async fn create_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "
            create table if not exists tunes (
                id bigserial primary key,
                book_number int not null,
                reference_number text not null,
                title text not null,
                type text not null,
                meter text not null,
                key_signature text not null,
                abc_notation text not null,
                file_path text not null,
                created_at timestamptz not null default now()
            )
        ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("create index if not exists tunes_book_number_idx on tunes(book_number)")
            .execute(&self.pool)
            .await?;

        debug!("schema ready");
        Ok(())
    }

    /// Removes every stored tune, returning how many were deleted.
    #[instrument(skip(self), ret, level = "trace")]
    pub async fn clear(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("delete from tunes").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Inserts `tunes` in order inside one transaction. Ids and timestamps
    /// are assigned by the database.
    #[instrument(skip(self, tunes), fields(n_tunes = tunes.len()), ret, level = "trace")]
    pub async fn insert_tunes_batch(&self, tunes: &[TuneRecord]) -> Result<u64, sqlx::Error> {
        if tunes.is_empty() {
            return Ok(0);
        }

        let mut transaction = self.pool.begin().await?;
        let mut inserted = 0;
        for chunk in tunes.chunks(INSERT_CHUNK_ROWS) {
            let mut query = insert_query(chunk);
            let result = query.build().execute(&mut *transaction).await?;
            inserted += result.rows_affected();
        }
        transaction.commit().await?;

        debug!(n_rows = inserted, "inserted tunes");
        Ok(inserted)
    }

    #[instrument(skip(self), level = "trace")]
    pub async fn search(&self, filter: &TuneFilter) -> Result<Vec<StoredTune>, sqlx::Error> {
        let mut query = filter.select_query();
        let tunes = query
            .build_query_as::<StoredTune>()
            .fetch_all(&self.pool)
            .await?;

        debug!(n_rows = tunes.len(), "search finished");
        Ok(tunes)
    }

    pub async fn get(&self, id: i64) -> Result<Option<StoredTune>, sqlx::Error> {
        sqlx::query_as(&format!("{} where id = $1", filter::SELECT_TUNES))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn summary(&self) -> Result<Summary, sqlx::Error> {
        sqlx::query_as(
            "
            select
                count(*) as total_tunes,
                count(distinct book_number) as total_books,
                count(distinct nullif(type, '')) as total_types,
                count(distinct nullif(key_signature, '')) as total_keys,
                (select type from tunes where type <> ''
                 group by type order by count(*) desc, type limit 1) as most_common_type,
                (select key_signature from tunes where key_signature <> ''
                 group by key_signature order by count(*) desc, key_signature limit 1)
                    as most_common_key
            from tunes
        ",
        )
        .fetch_one(&self.pool)
        .await
    }

    pub async fn tunes_per_book(&self) -> Result<Vec<BookCount>, sqlx::Error> {
        sqlx::query_as(
            "
            select book_number, count(*) as count from tunes
            group by book_number
            order by book_number
        ",
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn most_common_types(&self, n: i64) -> Result<Vec<ValueCount>, sqlx::Error> {
        self.most_common(Column::Type, n).await
    }

    pub async fn most_common_keys(&self, n: i64) -> Result<Vec<ValueCount>, sqlx::Error> {
        self.most_common(Column::KeySignature, n).await
    }

    #[instrument(skip(self), level = "trace")]
    async fn most_common(&self, column: Column, n: i64) -> Result<Vec<ValueCount>, sqlx::Error> {
        sqlx::query_as(&most_common_sql(column))
            .bind(n)
            .fetch_all(&self.pool)
            .await
    }
}

fn insert_query(tunes: &[TuneRecord]) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::new(
        "insert into tunes(book_number, reference_number, title, type, meter, key_signature, \
         abc_notation, file_path) ",
    );
    builder.push_values(tunes, |mut row, tune| {
        row.push_bind(tune.book_number)
            .push_bind(tune.reference_number.as_str())
            .push_bind(tune.title.as_str())
            .push_bind(tune.tune_type.as_str())
            .push_bind(tune.meter.as_str())
            .push_bind(tune.key_signature.as_str())
            .push_bind(tune.abc_notation.as_str())
            .push_bind(tune.file_path.as_str());
    });
    builder
}

fn most_common_sql(column: Column) -> String {
    let column = column.as_sql();
    format!(
        "
        select {column} as value, count(*) as count from tunes
        where {column} <> ''
        group by {column}
        order by count(*) desc, {column}
        limit $1
    "
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_query_binds_every_column() {
        let tunes = vec![
            TuneRecord {
                book_number: 1,
                title: "First".to_owned(),
                ..Default::default()
            },
            TuneRecord {
                book_number: 1,
                title: "Second".to_owned(),
                ..Default::default()
            },
        ];
        let query = insert_query(&tunes);

        assert!(query.sql().ends_with(
            "VALUES ($1, $2, $3, $4, $5, $6, $7, $8), ($9, $10, $11, $12, $13, $14, $15, $16)"
        ));
    }

    #[test]
    fn test_most_common_sql_skips_empty_values() {
        let sql = most_common_sql(Column::KeySignature);

        assert!(sql.contains("where key_signature <> ''"));
        assert!(sql.contains("order by count(*) desc, key_signature"));
    }
}
