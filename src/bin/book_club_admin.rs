use std::path::PathBuf;

use book_club::{
    book,
    config::Config,
    database,
    google_books::GoogleBooksClient,
    user::{self, RegisterRequest},
    utils::{SystemClock, init_log},
};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Book club maintenance commands")]
struct Args {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Overrides the configured database url
    #[arg(short, long)]
    database: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending migrations and exit
    Migrate,
    User {
        #[command(subcommand)]
        command: UserCommand,
    },
    Book {
        #[command(subcommand)]
        command: BookCommand,
    },
}

#[derive(Debug, Subcommand)]
enum UserCommand {
    List,
    Create {
        #[arg(short, long)]
        email: String,
        #[arg(short, long)]
        password: String,
        #[arg(short, long)]
        first_name: String,
        #[arg(short, long)]
        last_name: String,
    },
    Deactivate {
        id: i64,
    },
}

#[derive(Debug, Subcommand)]
enum BookCommand {
    List,
    /// Fetch a volume from Google Books and store it
    Import {
        google_books_id: String,
    },
    Delete {
        id: i64,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(database) = args.database {
        config.database_url = database;
    }
    let _guard = init_log(config.log_dir.clone(), &config.log_level)?;
    // connect applies migrations
    let database = database::connect(&config.database_url).await?;

    match args.command {
        Commands::Migrate => {
            println!("Database at {} is up to date", config.database_url);
        }
        Commands::User { command } => match command {
            UserCommand::List => {
                for user in user::list_all_users(&database).await? {
                    let state = if user.is_active { "" } else { " (inactive)" };
                    println!(
                        "{:<8} {:<32} {} {}{}",
                        user.id, user.email, user.first_name, user.last_name, state
                    );
                }
            }
            UserCommand::Create {
                email,
                password,
                first_name,
                last_name,
            } => {
                let request = RegisterRequest {
                    email,
                    password,
                    first_name,
                    last_name,
                };
                let created = user::register(&database, &SystemClock, request).await?;
                println!("User created with id: {}", created.id);
            }
            UserCommand::Deactivate { id } => {
                user::deactivate_user(&database, &SystemClock, id).await?;
                println!("User deactivated with id: {}", id);
            }
        },
        Commands::Book { command } => match command {
            BookCommand::List => {
                let mut skip = 0;
                loop {
                    let page = book::list_books(&database, Some(skip), None).await?;
                    for book in &page {
                        println!(
                            "{:<8} {:<16} {} / {}",
                            book.id, book.google_books_id, book.title, book.author
                        );
                    }
                    if page.len() < 100 {
                        break;
                    }
                    skip += page.len() as i64;
                }
            }
            BookCommand::Import { google_books_id } => {
                let client = GoogleBooksClient::from_config(&config)?;
                let (book, created) =
                    book::get_or_fetch_and_persist(&database, &client, &SystemClock, &google_books_id)
                        .await?;
                if created {
                    println!("Book imported with id: {}", book.id);
                } else {
                    println!("Book already stored with id: {}", book.id);
                }
            }
            BookCommand::Delete { id } => {
                book::delete_book(&database, id).await?;
                println!("Book deleted with id: {}", id);
            }
        },
    }
    Ok(())
}
