use sqlx::{QueryBuilder, Row, Sqlite};

use super::{Database, DatabaseError};
use crate::snapkeep::messages::{Conversation, MessageEntity};

type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug)]
struct MessageRow {
    pub id: i64,
    pub client_package: Option<String>,
    pub received_time: i64,
    pub received_from: String,
    pub message_content: String,
}

impl<'r, R> sqlx::FromRow<'r, R> for MessageRow
where
    R: sqlx::Row,
    &'r str: sqlx::ColumnIndex<R>,
    String: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    Option<String>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    i64: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    fn from_row(row: &'r R) -> std::result::Result<Self, sqlx::Error> {
        Ok(MessageRow {
            id: row.try_get("message_id")?,
            client_package: row.try_get("client_package")?,
            received_time: row.try_get("received_time")?,
            received_from: row.try_get("received_from")?,
            message_content: row.try_get("message_content")?,
        })
    }
}

impl From<MessageRow> for MessageEntity {
    fn from(row: MessageRow) -> Self {
        MessageEntity {
            id: row.id,
            client_package: row.client_package,
            time: row.received_time,
            sender_name: row.received_from,
            content: row.message_content,
        }
    }
}

impl MessageEntity {
    /// Inserts the message, silently ignoring duplicates of the
    /// (`time`, `sender`, `content`) triple. Returns the new rowid, or 0
    /// when the row already existed.
    pub(crate) async fn insert(&self, database: &Database) -> Result<i64> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO received_messages \
             (client_package, received_time, received_from, message_content) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&self.client_package)
        .bind(self.time)
        .bind(&self.sender_name)
        .bind(&self.content)
        .execute(&database.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(0)
        } else {
            Ok(result.last_insert_rowid())
        }
    }

    /// All messages from one sender, oldest first.
    pub(crate) async fn find_by_sender(
        sender: &str,
        database: &Database,
    ) -> Result<Vec<MessageEntity>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM received_messages WHERE received_from = ? \
             ORDER BY received_time ASC, message_id ASC",
        )
        .bind(sender)
        .fetch_all(&database.pool)
        .await?;

        Ok(rows.into_iter().map(MessageEntity::from).collect())
    }

    pub(crate) async fn delete(&self, database: &Database) -> Result<u64> {
        let result = sqlx::query("DELETE FROM received_messages WHERE message_id = ?")
            .bind(self.id)
            .execute(&database.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub(crate) async fn delete_many(
        messages: &[MessageEntity],
        database: &Database,
    ) -> Result<u64> {
        if messages.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM received_messages WHERE message_id IN (");
        let mut separated = builder.separated(", ");
        for message in messages {
            separated.push_bind(message.id);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&database.pool).await?;
        Ok(result.rows_affected())
    }

    /// Deletes every message of the given senders in one statement.
    pub(crate) async fn delete_by_senders(senders: &[String], database: &Database) -> Result<u64> {
        if senders.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM received_messages WHERE received_from IN (");
        let mut separated = builder.separated(", ");
        for sender in senders {
            separated.push_bind(sender);
        }
        separated.push_unseparated(")");

        let result = builder.build().execute(&database.pool).await?;
        Ok(result.rows_affected())
    }

    pub(crate) async fn delete_all(database: &Database) -> Result<u64> {
        let result = sqlx::query("DELETE FROM received_messages")
            .execute(&database.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl Conversation {
    /// One row per distinct sender carrying the most recent message as a
    /// preview, most recent sender first. SQLite resolves the bare columns
    /// from the row that supplied MAX(received_time).
    pub(crate) async fn find_all(database: &Database) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT received_from, MAX(received_time) AS latest_time, \
             message_content AS latest_content \
             FROM received_messages \
             GROUP BY received_from \
             ORDER BY latest_time DESC, received_from ASC",
        )
        .fetch_all(&database.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Conversation {
                    name: row.try_get("received_from")?,
                    latest_time: row.try_get("latest_time")?,
                    latest_content: row.try_get("latest_content")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(DatabaseError::from)
    }
}
