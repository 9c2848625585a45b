//! Borrows repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgConnection, Pool, Postgres, Row};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::BookShort,
        borrow::{BorrowDetails, BorrowQuery, BorrowRecord},
        policy::Policy,
    },
};

const DETAILS_SELECT: &str = r#"
    SELECT br.id, br.user_id, br.copy_id, br.borrow_date, br.due_date, br.return_date,
           c.license_key,
           b.id AS book_id, b.title AS book_title, b.isbn AS book_isbn,
           p.id AS policy_id, p.role_id AS policy_role_id,
           p.max_borrow_days, p.max_borrow_books, p.hold_hours
    FROM borrows br
    JOIN copies c ON br.copy_id = c.id
    JOIN books b ON c.book_id = b.id
    JOIN policies p ON br.policy_id = p.id
"#;

#[derive(Clone)]
pub struct BorrowsRepository {
    pool: Pool<Postgres>,
}

impl BorrowsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get borrow record by ID
    pub async fn get_by_id(&self, conn: &mut PgConnection, id: i32) -> AppResult<BorrowRecord> {
        sqlx::query_as::<_, BorrowRecord>("SELECT * FROM borrows WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrow with id {} not found", id)))
    }

    /// Get borrow with book, copy and policy resolved
    pub async fn get_details(&self, conn: &mut PgConnection, id: i32) -> AppResult<BorrowDetails> {
        let query = format!("{} WHERE br.id = $1", DETAILS_SELECT);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrow with id {} not found", id)))?;
        Ok(details_from_row(&row, Utc::now()))
    }

    /// List borrows with optional user and active filters
    pub async fn list(&self, query: &BorrowQuery) -> AppResult<Vec<BorrowDetails>> {
        let mut conditions = Vec::new();

        if query.user_id.is_some() {
            conditions.push("br.user_id = $1".to_string());
        }
        match query.active {
            Some(true) => conditions.push("br.return_date IS NULL".to_string()),
            Some(false) => conditions.push("br.return_date IS NOT NULL".to_string()),
            None => {}
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let select_q = format!("{} {} ORDER BY br.borrow_date DESC, br.id DESC", DETAILS_SELECT, where_clause);
        let mut builder = sqlx::query(&select_q);
        if let Some(user_id) = query.user_id {
            builder = builder.bind(user_id);
        }

        let now = Utc::now();
        let rows = builder.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|row| details_from_row(row, now)).collect())
    }

    /// Count unreturned borrows of a user
    pub async fn count_active_for_user(&self, conn: &mut PgConnection, user_id: i32) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrows WHERE user_id = $1 AND return_date IS NULL",
        )
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count)
    }

    /// Whether the user currently holds any copy of the book
    pub async fn user_has_active_for_book(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        book_id: i32,
    ) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM borrows br
                JOIN copies c ON br.copy_id = c.id
                WHERE br.user_id = $1 AND c.book_id = $2 AND br.return_date IS NULL
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(exists)
    }

    /// Insert a new borrow record
    pub async fn create(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        copy_id: i32,
        policy: &Policy,
        borrow_date: DateTime<Utc>,
    ) -> AppResult<BorrowRecord> {
        let record = sqlx::query_as::<_, BorrowRecord>(
            r#"
            INSERT INTO borrows (user_id, copy_id, policy_id, borrow_date, due_date)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(copy_id)
        .bind(policy.id)
        .bind(borrow_date)
        .bind(policy.due_date(borrow_date))
        .fetch_one(&mut *conn)
        .await?;
        Ok(record)
    }

    /// Set the return date if it is not set yet.
    ///
    /// Returns false when the borrow was already returned.
    pub async fn mark_returned(&self, conn: &mut PgConnection, id: i32, now: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query("UPDATE borrows SET return_date = $1 WHERE id = $2 AND return_date IS NULL")
            .bind(now)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Ids of unreturned borrows past their due date
    pub async fn overdue_ids(&self, now: DateTime<Utc>) -> AppResult<Vec<i32>> {
        let ids = sqlx::query_scalar::<_, i32>(
            "SELECT id FROM borrows WHERE due_date < $1 AND return_date IS NULL ORDER BY due_date, id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }
}

fn details_from_row(row: &PgRow, now: DateTime<Utc>) -> BorrowDetails {
    let due_date: DateTime<Utc> = row.get("due_date");
    let return_date: Option<DateTime<Utc>> = row.get("return_date");

    BorrowDetails {
        id: row.get("id"),
        user_id: row.get("user_id"),
        copy_id: row.get("copy_id"),
        license_key: row.get("license_key"),
        book: BookShort {
            id: row.get("book_id"),
            title: row.get("book_title"),
            isbn: row.get("book_isbn"),
        },
        policy: Policy {
            id: row.get("policy_id"),
            role_id: row.get("policy_role_id"),
            max_borrow_days: row.get("max_borrow_days"),
            max_borrow_books: row.get("max_borrow_books"),
            hold_hours: row.get("hold_hours"),
        },
        borrow_date: row.get("borrow_date"),
        due_date,
        return_date,
        is_overdue: return_date.is_none() && due_date < now,
    }
}
