//! Integration tests that run the `fiesta` binary.

use std::path::Path;
use std::process::{Command, Output};

use sqlx::PgPool;
use uuid::Uuid;

use fiesta_test_utils::{drop_test_db, pg_url};

fn fiesta(config_home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_fiesta"))
        .args(args)
        .env("XDG_CONFIG_HOME", config_home)
        .env_remove("FIESTA_DATABASE_URL")
        .env_remove("BOT_TOKEN")
        .env_remove("OPENAI_API_KEY")
        .env_remove("ASSISTANT_ID")
        .output()
        .expect("failed to run fiesta binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn init_writes_config_and_refuses_to_overwrite() {
    let home = tempfile::TempDir::new().unwrap();

    let out = fiesta(
        home.path(),
        &[
            "init",
            "--db-url",
            "postgresql://db.internal:5432/fiesta",
            "--bot-token",
            "123456:ABCDEFGHIJKLMNOP",
        ],
    );
    assert!(out.status.success(), "init failed: {}", stderr(&out));
    assert!(stdout(&out).contains("database.url = postgresql://db.internal:5432/fiesta"));
    assert!(!stdout(&out).contains("ABCDEFGHIJKLMNOP"), "token should be masked");

    let path = home.path().join("fiesta").join("config.toml");
    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("url = \"postgresql://db.internal:5432/fiesta\""));
    assert!(contents.contains("bot_token = \"123456:ABCDEFGHIJKLMNOP\""));
    assert!(contents.contains("port = 8000"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    let again = fiesta(home.path(), &["init"]);
    assert!(!again.status.success());
    assert!(stderr(&again).contains("already exists"));

    let forced = fiesta(home.path(), &["init", "--force"]);
    assert!(forced.status.success(), "init --force failed: {}", stderr(&forced));
}

#[test]
fn bot_without_token_explains_what_is_missing() {
    let home = tempfile::TempDir::new().unwrap();

    let out = fiesta(home.path(), &["bot"]);
    assert!(!out.status.success());
    assert!(
        stderr(&out).contains("telegram bot token not found"),
        "unexpected stderr: {}",
        stderr(&out)
    );
}

#[tokio::test]
async fn db_init_creates_and_migrates_database() {
    let home = tempfile::TempDir::new().unwrap();
    let db_name = format!("fiesta_cli_{}", Uuid::new_v4().simple());
    let url = format!("{}/{db_name}", pg_url().await);

    let out = fiesta(home.path(), &["db-init", "--database-url", &url]);
    assert!(out.status.success(), "db-init failed: {}", stderr(&out));
    let printed = stdout(&out);
    for table in ["holidays", "guests", "restaurants"] {
        assert!(
            printed.contains(&format!("{table}: 0 rows")),
            "missing {table} count in: {printed}"
        );
    }

    // A second run finds everything in place.
    let out = fiesta(home.path(), &["db-init", "--database-url", &url]);
    assert!(out.status.success(), "second db-init failed: {}", stderr(&out));

    let pool = PgPool::connect(&url).await.unwrap();
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(applied, 3);
    pool.close().await;

    drop_test_db(&db_name).await;
}
