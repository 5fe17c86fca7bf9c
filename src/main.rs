use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use notepage_lib::{bootstrap, init_logging, App, AppConfig, CachedPage, NewNote, QuerySession};

/// Browse and prune a LocalNative notes database from the terminal
#[derive(Parser)]
#[command(name = "notepage")]
#[command(version)]
struct Cli {
    /// SQLite database to open (default: ~/LocalNative/localnative.sqlite3)
    #[arg(long, env = "NOTEPAGE_DB", value_name = "PATH")]
    db: Option<PathBuf>,

    /// Settings file
    #[arg(long, env = "NOTEPAGE_SETTINGS", value_name = "PATH")]
    settings: Option<PathBuf>,

    /// Upper bound on one store call, in milliseconds
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,
}

const HELP: &str = "commands: search <text> | next | prev | delete <rowid> | refresh | retry | add <title> [#tag ...] | quit";

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let app = bootstrap(AppConfig {
        settings_path: cli.settings,
        db_path: cli.db,
        execute_timeout_ms: cli.timeout_ms,
    })
    .await?;

    let session = app.session.clone();
    match session.start().await {
        Ok(page) => render(&session, &page).await,
        Err(err) => eprintln!("error: {err}"),
    }
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match step(&app, &line).await {
            Step::Quit => break,
            Step::Help => println!("{HELP}"),
            Step::Skip => {}
            Step::Failed(message) => eprintln!("error: {message}"),
            Step::Page(page) => render(&session, &page).await,
        }
    }

    Ok(())
}

enum Step {
    Quit,
    Help,
    Skip,
    Failed(String),
    Page(Arc<CachedPage>),
}

/// Runs one REPL line. Errors are reported through [`Step::Failed`] so a bad
/// command never ends the loop.
async fn step(app: &App, line: &str) -> Step {
    let session = &app.session;
    let line = line.trim();
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));

    let outcome = match verb {
        "" => return Step::Skip,
        "quit" | "q" | "exit" => return Step::Quit,
        "search" | "s" | "/" => session.new_search(rest).await,
        "next" | "n" => session.next_page().await,
        "prev" | "p" => session.prev_page().await,
        "refresh" | "r" => session.refresh().await,
        "retry" => session.retry().await,
        "delete" | "d" => match rest.trim().parse::<i64>() {
            Ok(row_id) => session.delete(row_id).await,
            Err(_) => return Step::Failed("usage: delete <rowid>".to_string()),
        },
        "add" => {
            let (title, tags) = split_tags(rest);
            let added = app
                .store
                .insert_note(NewNote {
                    title,
                    tags,
                    ..NewNote::default()
                })
                .await;
            if let Err(err) = added {
                return Step::Failed(format!("{err:#}"));
            }
            session.refresh().await
        }
        _ => return Step::Help,
    };

    match outcome {
        Ok(page) => Step::Page(page),
        Err(err) => Step::Failed(err.to_string()),
    }
}

/// `some title #a #b` -> (`some title`, `a b`)
fn split_tags(input: &str) -> (String, String) {
    let (tags, words): (Vec<&str>, Vec<&str>) = input
        .split_whitespace()
        .partition(|word| word.starts_with('#'));
    let tags: Vec<&str> = tags.iter().map(|tag| tag.trim_start_matches('#')).collect();
    (words.join(" "), tags.join(" "))
}

async fn render(session: &QuerySession, page: &CachedPage) {
    println!();
    for item in page.get_ordered() {
        let tags = item.tag_list().join(", ");
        println!("{:>6}  {}", item.row_id, item.title);
        if !item.url.is_empty() {
            println!("        {}", item.url);
        }
        if !tags.is_empty() {
            println!("        [{tags}]");
        }
    }

    let query = session.query_state().await;
    let mut footer = session.current_pagination_label().await;
    if !query.query_text.is_empty() {
        footer = format!("{footer}  \"{}\"", query.query_text);
    }
    if session.has_previous_page().await {
        footer.push_str("  <prev");
    }
    if session.has_next_page().await {
        footer.push_str("  next>");
    }
    println!("{footer}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn app_in(dir: &TempDir) -> App {
        bootstrap(AppConfig {
            settings_path: Some(dir.path().join("settings.json")),
            db_path: Some(dir.path().join("notes.sqlite3")),
            execute_timeout_ms: None,
        })
        .await
        .unwrap()
    }

    #[test]
    fn split_tags_pulls_hashes_out_of_the_title() {
        assert_eq!(
            split_tags("rust book #lang #reading"),
            ("rust book".to_string(), "lang reading".to_string())
        );
    }

    #[tokio::test]
    async fn add_then_search_renders_the_new_note() {
        let dir = TempDir::new().unwrap();
        let app = app_in(&dir).await;
        app.session.start().await.unwrap();

        assert!(matches!(step(&app, "add tokio guide #async").await, Step::Page(page) if page.count() == 1));
        match step(&app, "search async").await {
            Step::Page(page) => assert_eq!(page.get_ordered()[0].title, "tokio guide"),
            _ => panic!("search did not produce a page"),
        }
    }

    #[tokio::test]
    async fn failed_add_reports_and_keeps_the_loop_going() {
        let dir = TempDir::new().unwrap();
        let app = app_in(&dir).await;
        app.session.start().await.unwrap();
        app.store
            .call(|conn| {
                conn.execute_batch("DROP TABLE note")?;
                Ok(())
            })
            .await
            .unwrap();

        assert!(matches!(step(&app, "add lost note").await, Step::Failed(_)));
        assert!(matches!(step(&app, "delete nope").await, Step::Failed(_)));
        assert!(matches!(step(&app, "   ").await, Step::Skip));
        assert!(matches!(step(&app, "frobnicate").await, Step::Help));
        assert!(matches!(step(&app, "quit").await, Step::Quit));
    }
}
