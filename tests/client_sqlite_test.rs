//! Integration tests for the data access facade over SQLite.
//!
//! Each test builds its own client over a fresh temp-file database, so the
//! suite is hermetic and needs no running server.

use corekit::DbError;
use corekit::config::ProfileEntry;
use corekit::db::{ConnectionFactory, DbClient, Statement};
use sqlx::Row;
use std::sync::Arc;
use tempfile::NamedTempFile;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
struct User {
    id: i64,
    name: String,
}

fn temp_db_path() -> String {
    NamedTempFile::new()
        .unwrap()
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

fn sqlite_client() -> DbClient {
    let entry = ProfileEntry::parse(&format!("default=sqlite://{}", temp_db_path())).unwrap();
    DbClient::new(Arc::new(ConnectionFactory::from_entries(vec![entry])))
}

async fn setup_user_table(client: &DbClient) {
    client
        .execute(&Statement::new(
            "create table if not exists user (id integer primary key, name text not null)",
        ))
        .await
        .unwrap();
    client
        .execute(&Statement::new("delete from user"))
        .await
        .unwrap();
}

fn insert(id: i64, name: &str) -> Statement {
    Statement::new("insert into user(id, name) values(?, ?)")
        .with_param(id)
        .with_param(name)
}

async fn user_count(client: &DbClient) -> i64 {
    client
        .execute_scalar(&Statement::new("select count(id) from user"))
        .await
        .unwrap()
}

#[tokio::test]
async fn execute_then_query_sees_written_row() {
    let client = sqlite_client();
    setup_user_table(&client).await;

    let affected = client.execute(&insert(1, "Test 01")).await.unwrap();
    assert_eq!(affected, 1);

    let users: Vec<User> = client
        .query(&Statement::new("select id, name from user where id = ?").with_param(1i64))
        .await
        .unwrap();
    assert_eq!(
        users,
        vec![User {
            id: 1,
            name: "Test 01".to_string()
        }]
    );
}

#[tokio::test]
async fn query_on_empty_table_returns_no_rows() {
    let client = sqlite_client();
    setup_user_table(&client).await;

    let users: Vec<User> = client
        .query(&Statement::new("select id, name from user"))
        .await
        .unwrap();
    assert!(users.is_empty());
}

#[tokio::test]
async fn query_first_errors_on_zero_rows() {
    let client = sqlite_client();
    setup_user_table(&client).await;

    let err = client
        .query_first::<User>(&Statement::new("select id, name from user"))
        .await
        .unwrap_err();
    assert!(err.is_row_not_found());
}

#[tokio::test]
async fn query_first_opt_returns_none_on_zero_rows() {
    let client = sqlite_client();
    setup_user_table(&client).await;

    let user: Option<User> = client
        .query_first_opt(&Statement::new("select id, name from user"))
        .await
        .unwrap();
    assert!(user.is_none());

    client.execute(&insert(1, "Test 01")).await.unwrap();
    client.execute(&insert(2, "Test 02")).await.unwrap();

    let user: Option<User> = client
        .query_first_opt(&Statement::new("select id, name from user order by id"))
        .await
        .unwrap();
    assert_eq!(user.unwrap().id, 1);
}

#[tokio::test]
async fn query_single_enforces_cardinality() {
    let client = sqlite_client();
    setup_user_table(&client).await;

    let err = client
        .query_single::<User>(&Statement::new("select id, name from user"))
        .await
        .unwrap_err();
    assert!(err.is_row_not_found());

    client.execute(&insert(1, "Test 01")).await.unwrap();
    let user: User = client
        .query_single(&Statement::new("select id, name from user"))
        .await
        .unwrap();
    assert_eq!(user.name, "Test 01");

    client.execute(&insert(2, "Test 02")).await.unwrap();
    let err = client
        .query_single::<User>(&Statement::new("select id, name from user"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::MoreThanOneRow));
}

#[tokio::test]
async fn query_single_opt_allows_zero_rejects_many() {
    let client = sqlite_client();
    setup_user_table(&client).await;

    let user: Option<User> = client
        .query_single_opt(&Statement::new("select id, name from user"))
        .await
        .unwrap();
    assert!(user.is_none());

    client.execute(&insert(1, "Test 01")).await.unwrap();
    client.execute(&insert(2, "Test 02")).await.unwrap();
    let err = client
        .query_single_opt::<User>(&Statement::new("select id, name from user"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::MoreThanOneRow));
}

#[tokio::test]
async fn execute_scalar_on_empty_table_returns_default() {
    let client = sqlite_client();
    setup_user_table(&client).await;

    assert_eq!(user_count(&client).await, 0);

    let name: String = client
        .execute_scalar(&Statement::new("select name from user where id = ?").with_param(9i64))
        .await
        .unwrap();
    assert_eq!(name, "");
}

#[tokio::test]
async fn execute_scalar_reads_back_update() {
    let client = sqlite_client();
    setup_user_table(&client).await;

    client.execute(&insert(1, "Test 01")).await.unwrap();
    client
        .execute(
            &Statement::new("update user set name = ? where id = ?")
                .with_param("Test 01 has been updated.")
                .with_param(1i64),
        )
        .await
        .unwrap();

    let name: String = client
        .execute_scalar(&Statement::new("select name from user where id = ?").with_param(1i64))
        .await
        .unwrap();
    assert_eq!(name, "Test 01 has been updated.");
}

#[tokio::test]
async fn execute_reader_walks_rows_forward() {
    let client = sqlite_client();
    setup_user_table(&client).await;

    for id in 1..=3 {
        client
            .execute(&insert(id, &format!("Test {id:02}")))
            .await
            .unwrap();
    }

    let mut reader = client
        .execute_reader(&Statement::new("select id, name from user order by id"))
        .await
        .unwrap();

    let mut users = Vec::new();
    while let Some(row) = reader.next_row().await {
        let row = row.unwrap();
        users.push(User {
            id: row.get(0),
            name: row.get(1),
        });
    }

    assert_eq!(users.len(), 3);
    assert_eq!(users[0].id, 1);
    assert_eq!(users[2].name, "Test 03");
}

#[tokio::test]
async fn query_multiple_groups_result_sets() {
    let client = sqlite_client();
    setup_user_table(&client).await;

    client.execute(&insert(1, "Test 01")).await.unwrap();
    client.execute(&insert(2, "Test 02")).await.unwrap();

    let mut multi = client
        .query_multiple(
            "select id, name from user order by id; select count(id) from user",
            None,
        )
        .await
        .unwrap();

    let first = multi.next_set().await.unwrap().unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].get::<i64, _>(0), 1);

    let second = multi.next_set().await.unwrap().unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].get::<i64, _>(0), 2);

    assert!(multi.next_set().await.is_none());
}

#[tokio::test]
async fn execute_transaction_commits_atomically() {
    let client = sqlite_client();
    setup_user_table(&client).await;

    let statements = vec![
        Statement::new("insert into user(id, name) values(1, 'Test 01')"),
        Statement::new("insert into user(id, name) values(2, 'Test 02')"),
        Statement::new("insert into user(id, name) values(3, 'Test 03')"),
    ];
    let affected = client.execute_transaction(None, &statements).await.unwrap();
    assert_eq!(affected, 3);
    assert_eq!(user_count(&client).await, 3);
}

#[tokio::test]
async fn execute_transaction_rolls_back_on_duplicate_key() {
    let client = sqlite_client();
    setup_user_table(&client).await;

    let statements = vec![
        Statement::new("insert into user(id, name) values(1, 'Test 01')"),
        Statement::new("insert into user(id, name) values(2, 'Test 02')"),
        Statement::new("insert into user(id, name) values(2, 'Test 02')"),
        Statement::new("insert into user(id, name) values(3, 'Test 03')"),
    ];
    let err = client
        .execute_transaction(None, &statements)
        .await
        .unwrap_err();
    // The original driver error is observable, not a wrapper.
    assert!(matches!(err, DbError::Execution(_)));
    assert_eq!(user_count(&client).await, 0);
}

#[tokio::test]
async fn transaction_callback_commits_on_success() {
    let client = sqlite_client();
    setup_user_table(&client).await;

    let tx_client = client.clone();
    let affected = client
        .transaction(None, move |tx| {
            Box::pin(async move {
                let mut affected = 0;
                affected += tx_client.execute_in(tx, &insert(1, "Test 01")).await?;
                affected += tx_client.execute_in(tx, &insert(2, "Test 02")).await?;
                affected += tx_client.execute_in(tx, &insert(3, "Test 03")).await?;
                Ok(affected)
            })
        })
        .await
        .unwrap();

    assert_eq!(affected, 3);
    assert_eq!(user_count(&client).await, 3);
}

#[tokio::test]
async fn transaction_callback_rolls_back_on_error() {
    let client = sqlite_client();
    setup_user_table(&client).await;

    let tx_client = client.clone();
    let err = client
        .transaction(None, move |tx| {
            Box::pin(async move {
                tx_client.execute_in(tx, &insert(1, "Test 01")).await?;
                tx_client.execute_in(tx, &insert(2, "Test 02")).await?;
                tx_client.execute_in(tx, &insert(2, "Test 02")).await?;
                tx_client.execute_in(tx, &insert(3, "Test 03")).await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Execution(_)));
    assert_eq!(user_count(&client).await, 0);
}

#[tokio::test]
async fn caller_supplied_transaction_keeps_its_lifecycle() {
    let client = sqlite_client();
    setup_user_table(&client).await;

    let mut tx = client.begin(None).await.unwrap();
    client.execute_in(&mut tx, &insert(1, "Test 01")).await.unwrap();
    client.execute_in(&mut tx, &insert(2, "Test 02")).await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(user_count(&client).await, 2);

    let mut tx = client.begin(None).await.unwrap();
    client.execute_in(&mut tx, &insert(3, "Test 03")).await.unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(user_count(&client).await, 2);
}

#[tokio::test]
async fn statement_profile_selector_routes_to_named_profile() {
    let main = temp_db_path();
    let other = temp_db_path();
    let entries = vec![
        ProfileEntry::parse(&format!("default=sqlite://{main}")).unwrap(),
        ProfileEntry::parse(&format!("archive=sqlite://{other}")).unwrap(),
    ];
    let client = DbClient::new(Arc::new(ConnectionFactory::from_entries(entries)));

    setup_user_table(&client).await;
    client
        .execute(
            &Statement::new(
                "create table if not exists user (id integer primary key, name text not null)",
            )
            .on_profile("archive"),
        )
        .await
        .unwrap();

    client
        .execute(&insert(1, "archived").on_profile("archive"))
        .await
        .unwrap();

    assert_eq!(user_count(&client).await, 0);
    let archived: i64 = client
        .execute_scalar(&Statement::new("select count(id) from user").on_profile("archive"))
        .await
        .unwrap();
    assert_eq!(archived, 1);
}

#[tokio::test]
async fn unknown_profile_is_a_configuration_error() {
    let client = sqlite_client();
    let err = client
        .execute(&Statement::new("select 1").on_profile("missing"))
        .await
        .unwrap_err();
    assert!(err.is_configuration());
}
