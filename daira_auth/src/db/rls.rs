//! Row-level-security context.
//!
//! Policies in the database read the current principal from the
//! `app.user_id` setting. It is set transaction-locally, so it is cleared on
//! commit or rollback and never leaks to the next request that reuses the
//! pooled connection.

use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use crate::auth::{Principal, UserId};

/// Setting read by row-level-security policies
pub const RLS_SETTING: &str = "app.user_id";

/// Set the principal for the current transaction on `conn`
pub async fn set_rls_context(conn: &mut PgConnection, user_id: UserId) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT set_config($1, $2, true)")
        .bind(RLS_SETTING)
        .bind(user_id.to_string())
        .execute(conn)
        .await?;
    Ok(())
}

/// Open a transaction scoped to `principal`.
///
/// Anonymous principals get a transaction with no setting, so policies see
/// no user.
pub async fn begin_with_principal(
    pool: &PgPool,
    principal: Principal,
) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    if let Principal::User(user_id) = principal {
        set_rls_context(&mut *tx, user_id).await?;
    }

    Ok(tx)
}
