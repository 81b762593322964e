use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use services::{
    AppServices, Clock, LoadReport, LoadSource, ProgressService, RemoteConfig, StaticCredentials,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use vocab_core::model::{Catalog, CategoryId, ItemId, LessonId, QuizResult};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArg { what: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidNumber { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArg { what } => write!(f, "missing {what}"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown command: {cmd}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn parse_number<T: std::str::FromStr>(raw: String, flag: &'static str) -> Result<T, ArgsError> {
    raw.parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- status");
    eprintln!("  cargo run -p app -- sync");
    eprintln!("  cargo run -p app -- item <id> [--stars <n>]");
    eprintln!("  cargo run -p app -- lesson <id> [--category <id>] [--stars <n>]");
    eprintln!("  cargo run -p app -- quiz <lesson_id> --score <n> [--questions <n>]");
    eprintln!();
    eprintln!("Options (any command):");
    eprintln!("  --db <sqlite_url>       default sqlite://vocab.sqlite3");
    eprintln!("  --api-url <url>         default {}", services::remote::DEFAULT_API_URL);
    eprintln!("  --content <file.json>   lesson catalog, used for totals and lookups");
    eprintln!("  --premium               unlock premium lessons from the catalog");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  VOCAB_DB_URL, VOCAB_API_URL, VOCAB_ACCESS_TOKEN, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Status,
    Sync,
    Item {
        id: ItemId,
        stars: u32,
    },
    Lesson {
        id: LessonId,
        category: Option<CategoryId>,
        stars: u32,
    },
    Quiz {
        id: LessonId,
        score: u32,
        questions: Option<u32>,
    },
}

#[derive(Debug)]
struct Args {
    db_url: String,
    api_url: Option<String>,
    content: Option<PathBuf>,
    premium: bool,
    command: Command,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, ArgsError> {
        let mut args = args.into_iter();
        let mut db_url = std::env::var("VOCAB_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://vocab.sqlite3".into(), normalize_sqlite_url);
        let mut api_url = None;
        let mut content = None;
        let mut premium = false;

        let mut command_name: Option<String> = None;
        let mut id: Option<String> = None;
        let mut stars: Option<u32> = None;
        let mut category: Option<CategoryId> = None;
        let mut score: Option<u32> = None;
        let mut questions: Option<u32> = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--api-url" => api_url = Some(require_value(&mut args, "--api-url")?),
                "--content" => content = Some(PathBuf::from(require_value(&mut args, "--content")?)),
                "--premium" => premium = true,
                "--stars" => {
                    stars = Some(parse_number(require_value(&mut args, "--stars")?, "--stars")?);
                }
                "--category" => {
                    category = Some(CategoryId::from(require_value(&mut args, "--category")?));
                }
                "--score" => {
                    score = Some(parse_number(require_value(&mut args, "--score")?, "--score")?);
                }
                "--questions" => {
                    questions = Some(parse_number(
                        require_value(&mut args, "--questions")?,
                        "--questions",
                    )?);
                }
                flag if flag.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ if command_name.is_none() => command_name = Some(arg),
                _ if id.is_none() => id = Some(arg),
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let name = command_name.ok_or(ArgsError::MissingArg { what: "command" })?;
        let command = match name.as_str() {
            "status" | "sync" if id.is_some() => {
                return Err(ArgsError::UnknownArg(id.unwrap_or_default()));
            }
            "status" => Command::Status,
            "sync" => Command::Sync,
            "item" => Command::Item {
                id: ItemId::new(parse_id(id, "item id")?),
                stars: stars.unwrap_or(1),
            },
            "lesson" => Command::Lesson {
                id: LessonId::new(parse_id(id, "lesson id")?),
                category,
                stars: stars.unwrap_or(1),
            },
            "quiz" => Command::Quiz {
                id: LessonId::new(parse_id(id, "lesson id")?),
                score: score.ok_or(ArgsError::MissingArg { what: "--score" })?,
                questions,
            },
            _ => return Err(ArgsError::UnknownCommand(name)),
        };

        Ok(Self {
            db_url,
            api_url,
            content,
            premium,
            command,
        })
    }
}

fn parse_id(raw: Option<String>, what: &'static str) -> Result<u64, ArgsError> {
    let raw = raw.ok_or(ArgsError::MissingArg { what })?;
    parse_number(raw, "id")
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn load_catalog(path: &std::path::Path) -> Result<Catalog, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let catalog: Catalog = serde_json::from_str(&raw)?;
    debug!(path = %path.display(), items = catalog.total_items(), "loaded lesson catalog");
    Ok(catalog)
}

/// Category a lesson is recorded under. With a catalog the lesson must also be
/// playable for this learner.
fn lesson_category(
    id: LessonId,
    category: Option<CategoryId>,
    catalog: Option<&Catalog>,
    has_premium: bool,
) -> Result<CategoryId, Box<dyn std::error::Error>> {
    let listed = match catalog {
        Some(catalog) => Some(catalog.playable_lesson(id, has_premium)?.1.clone()),
        None => None,
    };
    category
        .or(listed)
        .ok_or_else(|| ArgsError::MissingArg { what: "--category" }.into())
}

fn print_report(report: &LoadReport) {
    let source = match report.source {
        LoadSource::Remote => "server",
        LoadSource::Cache => "local cache",
        LoadSource::Empty => "nothing saved yet",
    };
    println!("progress loaded from {source}");
    if let Some(reason) = &report.degraded {
        println!("  offline: {reason}");
    }
}

fn print_summary(progress: &ProgressService) {
    let summary = progress.summary();
    println!(
        "items: {}/{} ({}%)",
        summary.completed_items, summary.total_items, summary.overall_completion_percentage
    );
    println!("stars: {}", summary.total_stars);
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.is_empty() || argv.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_usage();
        return Ok(());
    }

    let parsed = Args::parse(argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let remote = match parsed.api_url {
        Some(url) => RemoteConfig::new(url),
        None => RemoteConfig::from_env(),
    };
    let catalog = parsed.content.as_deref().map(load_catalog).transpose()?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let services = AppServices::new_sqlite(
        &parsed.db_url,
        Clock::default(),
        remote,
        Arc::new(StaticCredentials::from_env()),
    )
    .await?;
    let progress = services.progress();

    let report = progress.load_progress().await;
    if let Some(catalog) = &catalog {
        progress.apply_catalog(catalog);
    }

    match parsed.command {
        Command::Status => {
            print_report(&report);
            print_summary(&progress);
        }
        Command::Sync => {
            print_report(&report);
            let flushed = match report.flushed {
                Some(flushed) => flushed,
                None if report.source == LoadSource::Remote => progress.flush_pending().await,
                None => {
                    println!("server not reachable, pending progress stays queued");
                    return Ok(());
                }
            };
            println!(
                "synced {} pending update(s), {} failed",
                flushed.delivered, flushed.failed
            );
        }
        Command::Item { id, stars } => {
            progress.mark_item_completed(id, stars).await;
            info!(item = %id, stars, "item completed");
            println!("item {id}: {} star(s)", progress.item_stars(id));
            print_summary(&progress);
        }
        Command::Lesson {
            id,
            category,
            stars,
        } => {
            let category = lesson_category(id, category, catalog.as_ref(), parsed.premium)?;
            progress
                .mark_lesson_completed(id, stars, category.clone())
                .await;
            info!(lesson = %id, stars, category = %category.as_str(), "lesson completed");
            println!("lesson {id}: {} star(s)", progress.lesson_stars(id));
            println!(
                "category {}: {}% of lessons done",
                category.as_str(),
                progress.category_completion_percentage(&category)
            );
        }
        Command::Quiz {
            id,
            score,
            questions,
        } => {
            let questions = match (questions, &catalog) {
                (Some(questions), _) => Some(questions),
                (None, Some(catalog)) => catalog
                    .playable_lesson(id, parsed.premium)?
                    .0
                    .quiz
                    .as_ref()
                    .map(|quiz| u32::try_from(quiz.questions.len()).unwrap_or(u32::MAX)),
                (None, None) => None,
            };
            if let Some(total) = questions {
                let result = QuizResult::grade(score, total)?;
                println!(
                    "quiz {id}: {}/{} ({}%), {}",
                    result.score(),
                    result.total(),
                    result.percentage(),
                    result.tier().as_str()
                );
            }
            progress.mark_lesson_quiz_completed(id, score).await;
            info!(lesson = %id, score, "lesson quiz completed");
            println!("best score for lesson {id}: {}", progress.lesson_quiz_score(id));
        }
    }

    Ok(())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn,app=info,services=info,storage=info"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() {
    let result = match init_tracing() {
        Ok(()) => run().await,
        Err(err) => Err(err),
    };
    if let Err(err) = result {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use vocab_core::ContentError;

    use super::*;

    fn args(raw: &[&str]) -> Result<Args, ArgsError> {
        Args::parse(raw.iter().map(|s| (*s).to_string()))
    }

    #[test]
    fn parses_item_with_default_stars() {
        let parsed = args(&["item", "7", "--db", "sqlite::memory:"]).unwrap();
        assert_eq!(
            parsed.command,
            Command::Item {
                id: ItemId::new(7),
                stars: 1
            }
        );
        assert_eq!(parsed.db_url, "sqlite::memory:");
    }

    #[test]
    fn parses_lesson_and_quiz_options() {
        let parsed = args(&["lesson", "2", "--category", "fruits", "--stars", "3"]).unwrap();
        assert_eq!(
            parsed.command,
            Command::Lesson {
                id: LessonId::new(2),
                category: Some(CategoryId::new("fruits")),
                stars: 3
            }
        );

        let parsed = args(&["--api-url", "http://x/api", "quiz", "5", "--score", "4"]).unwrap();
        assert_eq!(parsed.api_url.as_deref(), Some("http://x/api"));
        assert_eq!(
            parsed.command,
            Command::Quiz {
                id: LessonId::new(5),
                score: 4,
                questions: None
            }
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            args(&["quiz", "5"]),
            Err(ArgsError::MissingArg { what: "--score" })
        ));
        assert!(matches!(
            args(&["item", "x"]),
            Err(ArgsError::InvalidNumber { .. })
        ));
        assert!(matches!(
            args(&["item"]),
            Err(ArgsError::MissingArg { what: "item id" })
        ));
        assert!(matches!(
            args(&["dance"]),
            Err(ArgsError::UnknownCommand(_))
        ));
        assert!(matches!(
            args(&["status", "--stars"]),
            Err(ArgsError::MissingValue { flag: "--stars" })
        ));
        assert!(matches!(
            args(&["status", "--verbose"]),
            Err(ArgsError::UnknownArg(_))
        ));
    }

    #[test]
    fn premium_flag_is_global() {
        assert!(!args(&["status"]).unwrap().premium);
        let parsed = args(&["--premium", "lesson", "5", "--content", "lessons.json"]).unwrap();
        assert!(parsed.premium);
        assert_eq!(parsed.content, Some(PathBuf::from("lessons.json")));
    }

    fn small_catalog() -> Catalog {
        serde_json::from_str(
            r#"[
                {"id": "english", "name": "English", "lessons": [
                    {"id": 1, "title": "Fruits", "items": [
                        {"id": 1, "image": "/apple.png", "names": {"english": "Apple", "malay": "Epal", "arabic": "Tuffaha"}}
                    ]},
                    {"id": 2, "title": "Colours"}
                ]},
                {"id": "arabic", "name": "Arabic", "isPremium": true, "lessons": [
                    {"id": 5, "title": "Greetings", "items": [
                        {"id": 9, "image": "/hello.png", "names": {"english": "Hello", "malay": "Helo", "arabic": "Marhaba"}}
                    ]}
                ]}
            ]"#,
        )
        .unwrap()
    }

    fn content_error<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a ContentError> {
        err.downcast_ref::<ContentError>()
    }

    #[test]
    fn lesson_category_comes_from_catalog_or_flag() {
        let catalog = small_catalog();
        assert_eq!(
            lesson_category(LessonId::new(1), None, Some(&catalog), false).unwrap(),
            CategoryId::new("english")
        );
        assert_eq!(
            lesson_category(LessonId::new(3), Some(CategoryId::new("fruits")), None, false)
                .unwrap(),
            CategoryId::new("fruits")
        );
        let err = lesson_category(LessonId::new(3), None, None, false).unwrap_err();
        assert_eq!(err.to_string(), "missing --category");
    }

    #[test]
    fn catalog_refuses_locked_and_empty_lessons() {
        let catalog = small_catalog();

        let err = lesson_category(LessonId::new(5), None, Some(&catalog), false).unwrap_err();
        assert_eq!(
            content_error(err.as_ref()),
            Some(&ContentError::Locked(LessonId::new(5)))
        );
        assert_eq!(
            lesson_category(LessonId::new(5), None, Some(&catalog), true).unwrap(),
            CategoryId::new("arabic")
        );

        // An explicit category does not bypass the catalog check.
        let err = lesson_category(
            LessonId::new(2),
            Some(CategoryId::new("english")),
            Some(&catalog),
            false,
        )
        .unwrap_err();
        assert_eq!(
            content_error(err.as_ref()),
            Some(&ContentError::EmptyLesson(LessonId::new(2)))
        );

        let err = lesson_category(LessonId::new(42), None, Some(&catalog), true).unwrap_err();
        assert_eq!(
            content_error(err.as_ref()),
            Some(&ContentError::UnknownLesson(LessonId::new(42)))
        );
    }

    #[test]
    fn relative_db_paths_become_absolute() {
        let url = normalize_sqlite_url("sqlite:data/vocab.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/vocab.sqlite3"));
        assert_eq!(
            normalize_sqlite_url("sqlite::memory:".into()),
            "sqlite::memory:"
        );
    }
}
