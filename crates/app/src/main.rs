use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use lesson_core::gate::{NavigationDecision, SubmissionOutcome};
use lesson_core::lock::LockReason;
use lesson_core::model::{CourseId, LearnerId, LessonDraft, LessonId};
use lesson_core::sidebar::{LessonStatus, SidebarEntry};
use services::{AppServices, Clock, GatingConfig, LessonPage, LessonPageError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lessons")]
#[command(author, version, about = "Lesson progression and quiz gating", long_about = None)]
struct Cli {
    /// `SQLite` database (path or sqlite:// URL)
    #[arg(long, env = "LEARN_DB_URL", default_value = "sqlite://dev.sqlite3")]
    db: String,

    /// Learner acting on the course
    #[arg(long, env = "LEARN_LEARNER_ID", default_value_t = 1)]
    learner: u64,

    /// Pass mark used when grading a quiz without its own passing score
    #[arg(long, env = "LEARN_QUIZ_DEFAULT", default_value_t = 70)]
    quiz_default: u16,

    /// Pass mark the lock check requires when the quiz has no passing score
    #[arg(long, env = "LEARN_GATE_DEFAULT", default_value_t = 70)]
    gate_default: u16,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a course from a JSON array of lessons
    Seed {
        course: u64,
        /// Path to the lessons JSON file
        file: PathBuf,
    },
    /// Show the course sidebar and progress
    Sidebar {
        course: u64,
        /// Lesson to highlight as current
        #[arg(long)]
        current: Option<u64>,
    },
    /// Open a lesson, or the resume lesson when none is given
    Open { course: u64, lesson: Option<u64> },
    /// Move from a lesson to the next one
    Next { course: u64, lesson: u64 },
    /// Mark a lesson complete
    Complete { course: u64, lesson: u64 },
    /// Answer a lesson quiz, one option index per question
    Quiz {
        course: u64,
        lesson: u64,
        #[arg(required = true)]
        answers: Vec<usize>,
    },
    /// Renumber a course to follow the given lesson ids
    Reorder {
        course: u64,
        #[arg(required = true)]
        lessons: Vec<u64>,
    },
    /// Remove a lesson from its course
    Delete { lesson: u64 },
    /// Post a question on a lesson
    Ask { lesson: u64, text: String },
    /// List the questions posted on a lesson
    Questions { lesson: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let config = GatingConfig::new(cli.quiz_default, cli.gate_default)
        .context("invalid pass marks")?;
    let db_url = normalize_sqlite_url(&cli.db)?;
    prepare_sqlite_dir(&db_url)?;
    let services = AppServices::new_sqlite(&db_url, Clock::system(), config)
        .await
        .with_context(|| format!("opening {db_url}"))?;
    let learner = LearnerId::new(cli.learner);
    tracing::info!(
        db = %db_url,
        %learner,
        quiz_default = %config.quiz_default(),
        gate_default = %config.gate_default(),
        "lesson store ready"
    );

    match cli.command {
        Commands::Seed { course, file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let drafts: Vec<LessonDraft> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", file.display()))?;
            let curriculum = services
                .curriculum()
                .import_course(CourseId::new(course), drafts)
                .await?;
            println!("imported {} lessons into course {course}", curriculum.total());
        }
        Commands::Sidebar { course, current } => {
            let pages = services.lesson_pages();
            let page = match pages
                .open_page(learner, CourseId::new(course), current.map(LessonId::new))
                .await
            {
                Ok(page) => page,
                Err(LessonPageError::Locked { lesson, reason }) => {
                    bail!("lesson {lesson} is locked: {}", describe_lock(&reason))
                }
                Err(err) => return Err(err.into()),
            };
            print_page(&page);
        }
        Commands::Open { course, lesson } => {
            let page = services
                .lesson_pages()
                .open_page(learner, CourseId::new(course), lesson.map(LessonId::new))
                .await?;
            print_lesson(&page);
        }
        Commands::Next { course, lesson } => {
            let pages = services.lesson_pages();
            let mut page = pages
                .open_page(learner, CourseId::new(course), Some(LessonId::new(lesson)))
                .await?;
            match pages.next(&mut page).await? {
                NavigationDecision::Allow { .. } => print_lesson(&page),
                NavigationDecision::PromptQuiz { target } => {
                    println!("pass the quiz on lesson {lesson} before opening lesson {target}");
                }
                NavigationDecision::Blocked { target, reason } => {
                    println!("lesson {target} is locked: {}", describe_lock(&reason));
                }
            }
        }
        Commands::Complete { course, lesson } => {
            let pages = services.lesson_pages();
            let mut page = pages
                .open_page(learner, CourseId::new(course), Some(LessonId::new(lesson)))
                .await?;
            pages.mark_complete(&mut page).await?;
            println!(
                "lesson {lesson} complete, course at {}",
                page.enrollment().progress_percent()
            );
        }
        Commands::Quiz {
            course,
            lesson,
            answers,
        } => {
            let pages = services.lesson_pages();
            let mut page = pages
                .open_page(learner, CourseId::new(course), Some(LessonId::new(lesson)))
                .await?;
            page.attempt_quiz()?;
            for (question, option) in answers.into_iter().enumerate() {
                page.select_answer(question, option)?;
            }
            match pages.submit_quiz(&mut page).await? {
                SubmissionOutcome::PassedAdvancing { result, target } => {
                    println!("passed with {}, moving to lesson {target}", result.score);
                    pages.advance(&mut page).await?;
                    print_lesson(&page);
                }
                SubmissionOutcome::Passed { result } => {
                    println!(
                        "passed with {} ({}/{} correct)",
                        result.score,
                        result.correct_count(),
                        result.per_question.len()
                    );
                }
                SubmissionOutcome::PassedBlocked {
                    result,
                    target,
                    reason,
                } => {
                    println!(
                        "passed with {}, but lesson {target} is locked: {}",
                        result.score,
                        describe_lock(&reason)
                    );
                }
                SubmissionOutcome::Failed { result } => {
                    println!(
                        "scored {}, {} needed ({}/{} correct)",
                        result.score,
                        result.threshold,
                        result.correct_count(),
                        result.per_question.len()
                    );
                }
            }
        }
        Commands::Reorder { course, lessons } => {
            let ordered: Vec<LessonId> = lessons.into_iter().map(LessonId::new).collect();
            let curriculum = services
                .curriculum()
                .reorder(CourseId::new(course), &ordered)
                .await?;
            for lesson in curriculum.lessons() {
                println!("{:>3}  {}  {}", lesson.order(), lesson.id(), lesson.title());
            }
        }
        Commands::Delete { lesson } => {
            services
                .curriculum()
                .delete_lesson(LessonId::new(lesson))
                .await?;
            println!("lesson {lesson} deleted");
        }
        Commands::Ask { lesson, text } => {
            let question = services
                .questions()
                .post_question(LessonId::new(lesson), learner, &text)
                .await?;
            println!("posted question {}", question.id());
        }
        Commands::Questions { lesson } => {
            for question in services
                .questions()
                .list_questions(LessonId::new(lesson))
                .await?
            {
                println!(
                    "{}  learner {}  {}",
                    question.posted_at().format("%Y-%m-%d %H:%M"),
                    question.learner_id(),
                    question.text()
                );
            }
        }
    }

    Ok(())
}

fn print_lesson(page: &LessonPage) {
    match page.lesson() {
        Some(lesson) => {
            println!("lesson {}: {}", lesson.id(), lesson.title());
            if let Some(quiz) = lesson.gating_quiz() {
                for (index, question) in quiz.questions().iter().enumerate() {
                    println!("  Q{index}. {}", question.text());
                    for (option, text) in question.options().iter().enumerate() {
                        println!("      {option}) {text}");
                    }
                }
            }
        }
        None => println!("lesson {} is no longer in the course", page.lesson_id()),
    }
}

fn print_page(page: &LessonPage) {
    let summary = page.summary();
    println!(
        "{}/{} lessons complete ({})",
        summary.completed, summary.total, summary.percent
    );
    if let Some(resume) = summary.resume_at {
        println!("resume at lesson {resume}");
    }
    for entry in page.sidebar() {
        println!("{}", sidebar_row(&entry));
    }
}

fn sidebar_row(entry: &SidebarEntry) -> String {
    let marker = match entry.status {
        LessonStatus::Completed => "[x]",
        LessonStatus::Current => "[>]",
        LessonStatus::Locked => "[#]",
        LessonStatus::Available => "[ ]",
    };
    let mut row = format!("{marker} {:>3}. {}", entry.order, entry.title);
    if entry.is_preview {
        row.push_str(" (preview)");
    }
    if entry.has_quiz {
        match entry.quiz_score {
            Some(score) => row.push_str(&format!(" quiz {score}")),
            None => row.push_str(" quiz"),
        }
    }
    if let Some(reason) = &entry.lock_reason {
        row.push_str(" - ");
        row.push_str(&describe_lock(reason));
    }
    row
}

fn describe_lock(reason: &LockReason) -> String {
    match reason {
        LockReason::PreviousIncomplete { previous } => {
            format!("complete lesson {previous} first")
        }
        LockReason::QuizNotPassed {
            previous,
            score: Some(score),
            required,
        } => format!("quiz on lesson {previous} scored {score}, {required} needed"),
        LockReason::QuizNotPassed {
            previous,
            score: None,
            required,
        } => format!("pass the quiz on lesson {previous} ({required})"),
        LockReason::StaleDependency { previous, .. } => {
            format!("progress before lesson {previous} needs to be redone")
        }
    }
}

fn normalize_sqlite_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("invalid --db value: {raw:?}");
    }
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return Ok(trimmed.to_owned());
    }

    let path = Path::new(trimmed.strip_prefix("sqlite:").unwrap_or(trimmed));
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("resolving the database path")?
            .join(path)
    };
    Ok(format!("sqlite://{}", absolute.display()))
}

/// The store creates the database file itself; its directory must exist.
fn prepare_sqlite_dir(db_url: &str) -> Result<()> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = Path::new(path.split('?').next().unwrap_or(path));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}
