use super::*;

const USER: &str = "6f1f2c6e-8d3b-4f7a-9a51-2f3c8d9e0b11";
const ITEM: &str = "0b7e4c1a-2d5f-4e8b-b6a3-9c1d2e3f4a5b";

#[test]
fn no_command_is_none() {
    let cli = Cli::try_parse_from(["syncq-cli"]).expect("expected valid cli args");
    assert!(cli.command.is_none());
}

#[test]
fn parses_db_migrate_command() {
    let cli = Cli::try_parse_from(["syncq-cli", "db", "migrate"]).expect("expected valid cli args");

    assert!(matches!(
        cli.command,
        Some(Commands::Db {
            command: DbCommands::Migrate
        })
    ));
}

#[test]
fn parses_process_command() {
    let cli = Cli::try_parse_from(["syncq-cli", "process"]).expect("expected valid cli args");
    assert!(matches!(cli.command, Some(Commands::Process)));
}

#[test]
fn parses_enqueue_with_defaults() {
    let cli = Cli::try_parse_from([
        "syncq-cli",
        "enqueue",
        "--user",
        USER,
        "--sync-type",
        "products",
    ])
    .expect("expected valid cli args");

    match cli.command {
        Some(Commands::Enqueue {
            user,
            sync_type,
            direction,
            integration,
        }) => {
            assert_eq!(user.to_string(), USER);
            assert_eq!(sync_type, "products");
            assert!(direction.is_none());
            assert!(integration.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn enqueue_rejects_malformed_user_id() {
    let result = Cli::try_parse_from([
        "syncq-cli",
        "enqueue",
        "--user",
        "not-a-uuid",
        "--sync-type",
        "stock",
    ]);
    assert!(result.is_err());
}

#[test]
fn status_limit_defaults_to_twenty() {
    let cli = Cli::try_parse_from(["syncq-cli", "status", "--user", USER])
        .expect("expected valid cli args");
    assert!(matches!(
        cli.command,
        Some(Commands::Status {
            limit: 20,
            status: None,
            ..
        })
    ));
}

#[test]
fn parses_cancel_and_retry() {
    let cancel = Cli::try_parse_from(["syncq-cli", "cancel", "--user", USER, "--id", ITEM])
        .expect("expected valid cli args");
    assert!(matches!(cancel.command, Some(Commands::Cancel { id, .. }) if id.to_string() == ITEM));

    let retry = Cli::try_parse_from(["syncq-cli", "retry", "--user", USER, "--id", ITEM])
        .expect("expected valid cli args");
    assert!(matches!(retry.command, Some(Commands::Retry { .. })));
}

#[test]
fn purge_days_is_optional() {
    let cli = Cli::try_parse_from(["syncq-cli", "purge"]).expect("expected valid cli args");
    assert!(matches!(cli.command, Some(Commands::Purge { days: None })));

    let cli = Cli::try_parse_from(["syncq-cli", "purge", "--days", "30"])
        .expect("expected valid cli args");
    assert!(matches!(cli.command, Some(Commands::Purge { days: Some(30) })));
}

#[test]
fn purge_days_beyond_retention_limit_is_rejected() {
    let result = Cli::try_parse_from(["syncq-cli", "purge", "--days", "200000000"]);
    assert!(result.is_err());
}

#[tokio::test]
async fn purge_with_unrepresentable_window_errors_instead_of_panicking() {
    let store = syncq_dispatch::MemorySyncStore::new();
    let result = queue::run_purge(&store, u32::MAX).await;
    assert!(result.is_err());
}
