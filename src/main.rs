use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use souq::auth::Auth;
use souq::catalog;
use souq::comments::CommentThread;
use souq::config::Config;
use souq::db::{Database, Resolution};
use souq::error::AppError;
use souq::models::{
    CommentNode, Listing, ListingDraft, Locale, PostType, ProfileUpdate, Session, WorkType,
};
use souq::query::{ListingQuery, SortOrder};
use souq::sitemap;
use souq::sync::{BackoffPolicy, ProfileSync};
use souq::validate;

#[derive(Parser)]
#[command(name = "souq")]
#[command(about = "Job board - post, browse, like and discuss job listings")]
struct Cli {
    /// Session token from `souq login`
    #[arg(long, global = true, env = "SOUQ_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Output language (ar, en)
    #[arg(long, global = true)]
    locale: Option<Locale>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Create an account
    Signup {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,

        /// Display name
        #[arg(long)]
        name: String,
    },

    /// Sign in and print a session token
    Login {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,
    },

    /// Revoke the current session token
    Logout,

    /// Show the signed-in profile
    Whoami,

    /// Edit the signed-in profile (empty value clears a field)
    Profile {
        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        /// Country code, e.g. SA
        #[arg(long)]
        country: Option<String>,

        #[arg(long)]
        city: Option<String>,

        /// Category id (see `souq categories`)
        #[arg(long)]
        category: Option<String>,
    },

    /// Post a new listing
    Post(ListingArgs),

    /// Edit one of your listings
    Edit {
        /// Listing ID
        id: i64,

        #[command(flatten)]
        fields: ListingArgs,
    },

    /// Browse listings
    List {
        /// seeking_worker or seeking_job
        #[arg(short = 't', long = "type")]
        post_type: Option<PostType>,

        #[arg(long)]
        country: Option<String>,

        #[arg(long)]
        city: Option<String>,

        #[arg(short, long)]
        category: Option<String>,

        #[arg(short, long)]
        work_type: Option<WorkType>,

        /// Text to look for in titles and descriptions
        #[arg(short, long)]
        search: Option<String>,

        /// newest, oldest or most_liked
        #[arg(long, default_value = "newest")]
        sort: SortOrder,

        #[arg(short, long)]
        limit: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show a listing by slug or ID
    Show {
        /// Slug or ID
        key: String,
    },

    /// Like or unlike a listing
    Like {
        /// Listing ID
        id: i64,
    },

    /// List the listings you liked
    Liked,

    /// Manage comments
    Comment {
        #[command(subcommand)]
        command: CommentCommands,
    },

    /// List job categories
    Categories,

    /// List countries and cities
    Countries,

    /// Write sitemap.xml and robots.txt
    Sitemap {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Recompute like counters from stored likes
    Reconcile,

    /// Follow profile changes for the current session
    Watch,
}

#[derive(Subcommand)]
enum CommentCommands {
    /// Comment on a listing
    Add {
        /// Listing ID
        listing: i64,

        text: String,

        /// Comment ID to reply to
        #[arg(short, long)]
        parent: Option<i64>,
    },

    /// Change the text of your comment
    Edit {
        /// Comment ID
        id: i64,

        text: String,
    },

    /// Delete your comment and its replies
    Delete {
        /// Comment ID
        id: i64,
    },

    /// Show the comments of a listing
    List {
        /// Listing ID
        listing: i64,
    },
}

#[derive(Args)]
struct ListingArgs {
    /// seeking_worker or seeking_job
    #[arg(short = 't', long = "type")]
    post_type: Option<PostType>,

    #[arg(long)]
    title: Option<String>,

    #[arg(short, long)]
    description: Option<String>,

    /// Country code, e.g. SA
    #[arg(long)]
    country: Option<String>,

    #[arg(long)]
    city: Option<String>,

    /// Category id (see `souq categories`)
    #[arg(short, long)]
    category: Option<String>,

    /// Free-text category when none fits
    #[arg(long)]
    category_name: Option<String>,

    /// Salary or compensation, free text
    #[arg(long)]
    salary: Option<String>,

    #[arg(short, long)]
    work_type: Option<WorkType>,

    #[arg(long)]
    phone: Option<String>,

    #[arg(long)]
    email: Option<String>,
}

impl ListingArgs {
    /// Overlay the given flags on top of `base`.
    fn apply(self, mut base: ListingDraft) -> ListingDraft {
        if self.post_type.is_some() {
            base.post_type = self.post_type;
        }
        if let Some(title) = self.title {
            base.title = title;
        }
        if let Some(description) = self.description {
            base.description = description;
        }
        if let Some(country) = self.country {
            base.country = country;
        }
        if self.city.is_some() {
            base.city = self.city;
        }
        if self.category.is_some() {
            base.category_id = self.category;
        }
        if self.category_name.is_some() {
            base.category_name = self.category_name;
        }
        if self.salary.is_some() {
            base.salary = self.salary;
        }
        if self.work_type.is_some() {
            base.work_type = self.work_type;
        }
        if self.phone.is_some() {
            base.contact_phone = self.phone;
        }
        if self.email.is_some() {
            base.contact_email = self.email;
        }
        base
    }
}

fn draft_from(listing: &Listing) -> ListingDraft {
    ListingDraft {
        post_type: Some(listing.post_type),
        title: listing.title.clone(),
        category_id: listing.category_id.clone(),
        category_name: listing.category_name.clone(),
        country: listing.country.clone(),
        city: listing.city.clone(),
        salary: listing.salary.clone(),
        work_type: Some(listing.work_type),
        description: listing.description.clone(),
        contact_phone: listing.contact_phone.clone(),
        contact_email: listing.contact_email.clone(),
    }
}

fn require_session(auth: &Auth, token: Option<&str>) -> Result<Session, AppError> {
    let token = token.ok_or(AppError::Unauthorized)?;
    auth.authenticate(token)
}

fn category_label(listing: &Listing, locale: Locale) -> String {
    listing
        .category_id
        .as_deref()
        .and_then(catalog::category)
        .map(|c| c.name(locale).to_string())
        .or_else(|| listing.category_name.clone())
        .unwrap_or_else(|| "-".to_string())
}

fn location_label(listing: &Listing, locale: Locale) -> String {
    let Some(country) = catalog::country(&listing.country) else {
        return listing.country.clone();
    };
    match listing.city.as_deref().and_then(|c| country.city(c)) {
        Some(city) => format!("{}, {}", city.name(locale), country.name(locale)),
        None => country.name(locale).to_string(),
    }
}

fn print_listings(listings: &[Listing], locale: Locale) {
    println!(
        "{:<6} {:<16} {:<30} {:<22} {:<12} {:>6}",
        "ID", "TYPE", "TITLE", "LOCATION", "WORK", "LIKES"
    );
    println!("{}", "-".repeat(97));
    for listing in listings {
        println!(
            "{:<6} {:<16} {:<30} {:<22} {:<12} {:>6}",
            listing.id,
            truncate(listing.post_type.label(locale), 16),
            truncate(&listing.title, 28),
            truncate(&location_label(listing, locale), 20),
            truncate(listing.work_type.label(locale), 12),
            listing.like_count
        );
    }
}

fn print_listing(listing: &Listing, locale: Locale) {
    println!("Listing #{} ({})", listing.id, listing.slug);
    println!("Title: {}", listing.title);
    println!("Type: {}", listing.post_type.label(locale));
    println!("Category: {}", category_label(listing, locale));
    println!("Location: {}", location_label(listing, locale));
    println!("Work: {}", listing.work_type.label(locale));
    if let Some(salary) = &listing.salary {
        println!("Salary: {}", salary);
    }
    if let Some(phone) = &listing.contact_phone {
        println!("Phone: {}", phone);
    }
    if let Some(email) = &listing.contact_email {
        println!("Email: {}", email);
    }
    println!("Likes: {}", listing.like_count);
    println!("Posted: {}", listing.created_at);
    println!("\n--- Description ---");
    for line in textwrap::wrap(&listing.description, 80) {
        println!("{}", line);
    }
}

fn print_comments(nodes: &[CommentNode], depth: usize) {
    for node in nodes {
        let indent = "  ".repeat(depth);
        let c = &node.comment;
        println!("{}#{} {} ({})", indent, c.id, c.author_name, truncate(&c.created_at, 16));
        let width = 80usize.saturating_sub(indent.len() + 2).max(20);
        for line in textwrap::wrap(&c.text, width) {
            println!("{}  {}", indent, line);
        }
        print_comments(&node.replies, depth + 1);
    }
}

fn run(cli: Cli, config: &Config, locale: Locale) -> Result<()> {
    let mut db = Database::open(&config.db_path)
        .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?;
    let token = cli.token.as_deref();

    if !matches!(cli.command, Commands::Init | Commands::Categories | Commands::Countries) {
        db.ensure_initialized()?;
    }

    match cli.command {
        Commands::Init => {
            db.init()?;
            println!("Database initialized at {}", config.db_path.display());
        }

        Commands::Signup {
            email,
            password,
            name,
        } => {
            let session = Auth::new(&db, config.session_ttl_hours).sign_up(&email, &password, &name)?;
            println!("Account created for {}", email);
            println!("export SOUQ_TOKEN={}", session.token);
        }

        Commands::Login { email, password } => {
            let session = Auth::new(&db, config.session_ttl_hours).sign_in(&email, &password)?;
            println!("Signed in, session valid until {}", session.expires_at);
            println!("export SOUQ_TOKEN={}", session.token);
        }

        Commands::Logout => {
            let token = token.ok_or(AppError::Unauthorized)?;
            Auth::new(&db, config.session_ttl_hours).sign_out(token)?;
            println!("Signed out.");
        }

        Commands::Whoami => {
            let auth = Auth::new(&db, config.session_ttl_hours);
            let session = require_session(&auth, token)?;
            let profile = auth.profile(&session)?;
            println!("User #{}", profile.id);
            println!("Name: {}", profile.display_name);
            println!("Email: {}", profile.email);
            if let Some(phone) = &profile.phone {
                println!("Phone: {}", phone);
            }
            if let Some(country) = profile.country.as_deref().and_then(catalog::country) {
                let city = profile
                    .city
                    .as_deref()
                    .and_then(|c| country.city(c))
                    .map(|c| format!("{}, ", c.name(locale)))
                    .unwrap_or_default();
                println!("Location: {}{}", city, country.name(locale));
            }
            if let Some(category) = profile.category_id.as_deref().and_then(catalog::category) {
                println!("Category: {}", category.name(locale));
            }
            println!("Session expires: {}", session.expires_at);
        }

        Commands::Profile {
            name,
            phone,
            country,
            city,
            category,
        } => {
            let auth = Auth::new(&db, config.session_ttl_hours);
            let session = require_session(&auth, token)?;
            let update = ProfileUpdate {
                display_name: name,
                phone,
                country,
                city,
                category_id: category,
            };
            let profile = auth.update_profile(&session, &update)?;
            println!("Profile updated for {}.", profile.display_name);
        }

        Commands::Post(fields) => {
            let session = require_session(&Auth::new(&db, config.session_ttl_hours), token)?;
            let draft = fields.apply(ListingDraft::default());
            if draft.category_id.is_none() {
                if let Some(suggestion) = draft.category_name.as_deref().and_then(catalog::suggest_category) {
                    println!(
                        "Hint: category '{}' looks like --category {}",
                        draft.category_name.as_deref().unwrap_or_default(),
                        suggestion.id
                    );
                }
            }
            let valid = validate::listing(&draft)?;
            let listing = db.insert_listing(session.user_id, &valid)?;
            println!("Posted listing #{} at /jobs/{}", listing.id, listing.slug);
        }

        Commands::Edit { id, fields } => {
            let session = require_session(&Auth::new(&db, config.session_ttl_hours), token)?;
            let existing = db
                .get_listing(id)?
                .ok_or_else(|| AppError::not_found("listing", id))?;
            let valid = validate::listing(&fields.apply(draft_from(&existing)))?;
            let listing = db.update_listing(session.user_id, id, &valid)?;
            println!("Updated listing #{} at /jobs/{}", listing.id, listing.slug);
        }

        Commands::List {
            post_type,
            country,
            city,
            category,
            work_type,
            search,
            sort,
            limit,
            json,
        } => {
            let query = ListingQuery {
                post_type,
                country,
                city,
                category_id: category,
                work_type,
                text: search,
                sort,
                limit,
            };
            let listings = query.execute(&db);
            if json {
                println!("{}", serde_json::to_string_pretty(&listings)?);
            } else if listings.is_empty() {
                println!("No listings found.");
            } else {
                print_listings(&listings, locale);
            }
        }

        Commands::Show { key } => {
            let listing = match db.resolve_listing(&key)? {
                Resolution::Found(listing) => *listing,
                Resolution::Redirect(slug) => {
                    info!(from = %key, to = %slug, "Redirecting to canonical slug");
                    println!("(moved to /jobs/{})\n", slug);
                    db.get_listing_by_slug(&slug)?
                        .ok_or_else(|| AppError::not_found("listing", &slug))?
                }
                Resolution::NotFound => return Err(AppError::not_found("listing", key).into()),
            };
            print_listing(&listing, locale);

            let thread = CommentThread::load(&db, listing.id)?;
            if !thread.tree().is_empty() {
                println!("\n--- Comments ({}) ---", thread.tree().len());
                print_comments(thread.tree().roots(), 0);
            }
        }

        Commands::Like { id } => {
            let session = require_session(&Auth::new(&db, config.session_ttl_hours), token)?;
            let state = db.toggle_like(id, session.user_id)?;
            if state.liked {
                println!("Liked listing #{} ({} likes).", id, state.like_count);
            } else {
                println!("Removed like from listing #{} ({} likes).", id, state.like_count);
            }
        }

        Commands::Liked => {
            let session = require_session(&Auth::new(&db, config.session_ttl_hours), token)?;
            let liked = db.liked_listings(session.user_id)?;
            if liked.is_empty() {
                println!("No liked listings.");
            } else {
                println!("{:<6} {:<30} {:<22} {:>6}  {}", "ID", "TITLE", "LOCATION", "LIKES", "LIKED");
                println!("{}", "-".repeat(84));
                for (listing, interest) in &liked {
                    println!(
                        "{:<6} {:<30} {:<22} {:>6}  {}",
                        listing.id,
                        truncate(&listing.title, 28),
                        truncate(&location_label(listing, locale), 20),
                        listing.like_count,
                        truncate(&interest.created_at, 16)
                    );
                }
            }
        }

        Commands::Comment { command } => {
            let auth = Auth::new(&db, config.session_ttl_hours);
            match command {
                CommentCommands::List { listing } => {
                    let thread = CommentThread::load(&db, listing)?;
                    if thread.tree().is_empty() {
                        println!("No comments on listing #{}.", listing);
                    } else {
                        print_comments(thread.tree().roots(), 0);
                    }
                }

                CommentCommands::Add {
                    listing,
                    text,
                    parent,
                } => {
                    let session = require_session(&auth, token)?;
                    let profile = auth.profile(&session)?;
                    let mut thread = CommentThread::load(&db, listing)?;
                    let comment =
                        thread.post(&db, session.user_id, &profile.display_name, &text, parent)?;
                    println!("Added comment #{}.", comment.id);
                }

                CommentCommands::Edit { id, text } => {
                    let session = require_session(&auth, token)?;
                    let listing = db
                        .get_comment(id)?
                        .ok_or_else(|| AppError::not_found("comment", id))?
                        .listing_id;
                    let mut thread = CommentThread::load(&db, listing)?;
                    thread.edit(&db, session.user_id, id, &text)?;
                    println!("Updated comment #{}.", id);
                }

                CommentCommands::Delete { id } => {
                    let session = require_session(&auth, token)?;
                    let listing = db
                        .get_comment(id)?
                        .ok_or_else(|| AppError::not_found("comment", id))?
                        .listing_id;
                    let mut thread = CommentThread::load(&db, listing)?;
                    let removed = thread.delete(&db, session.user_id, id)?;
                    println!("Deleted {} comment(s).", removed);
                }
            }
        }

        Commands::Categories => {
            println!("{:<18} {}", "ID", "NAME");
            println!("{}", "-".repeat(44));
            for category in catalog::CATEGORIES {
                println!("{:<18} {}", category.id, category.name(locale));
            }
        }

        Commands::Countries => {
            for country in catalog::COUNTRIES {
                println!("{} - {}", country.code, country.name(locale));
                for city in country.cities {
                    println!("    {:<14} {}", city.id, city.name(locale));
                }
            }
        }

        Commands::Sitemap { out } => {
            std::fs::create_dir_all(&out)
                .with_context(|| format!("Failed to create {}", out.display()))?;
            let xml = sitemap::generate(&db, &config.site_url)?;
            let sitemap_path = out.join("sitemap.xml");
            std::fs::write(&sitemap_path, xml)
                .with_context(|| format!("Failed to write {}", sitemap_path.display()))?;
            let robots_path = out.join("robots.txt");
            std::fs::write(&robots_path, sitemap::robots_txt(&config.site_url))
                .with_context(|| format!("Failed to write {}", robots_path.display()))?;
            println!(
                "Wrote {} and {} ({} listings)",
                sitemap_path.display(),
                robots_path.display(),
                db.listing_count()?
            );
        }

        Commands::Reconcile => {
            let drift = db.reconcile_like_counts()?;
            if drift.is_empty() {
                println!("All like counters match.");
            } else {
                println!("{:<8} {:>8} {:>8}", "LISTING", "STORED", "ACTUAL");
                println!("{}", "-".repeat(26));
                for d in &drift {
                    println!("{:<8} {:>8} {:>8}", d.listing_id, d.stored, d.actual);
                }
                println!("\nRepaired {} counter(s).", drift.len());
            }
        }

        Commands::Watch => {
            let session = require_session(&Auth::new(&db, config.session_ttl_hours), token)?;
            watch_profile(db, session, config)?;
        }
    }

    Ok(())
}

fn watch_profile(db: Database, session: Session, config: &Config) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let store = Arc::new(Mutex::new(db));
    let policy = BackoffPolicy::new(config.poll_interval);

    runtime.block_on(async move {
        let mut sync = ProfileSync::new();
        sync.signed_in(session);
        let mut rx = sync.subscribe();

        let printer = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                match (&state.profile, &state.session) {
                    (Some(profile), _) => println!(
                        "[{:?}] {} <{}> {}",
                        state.status,
                        profile.display_name,
                        profile.email,
                        profile.updated_at
                    ),
                    (None, Some(_)) => println!("[{:?}]", state.status),
                    (None, None) => println!("Signed out."),
                }
            }
        });

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, stopping");
        };
        let sync = sync.run(store, policy, shutdown).await;
        drop(sync);
        printer.await.map_err(|e| anyhow!("printer task failed: {e}"))
    })
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load();
    let locale = cli.locale.unwrap_or(config.locale);

    if let Err(err) = run(cli, &config, locale) {
        error!("{err:#}");
        match err.downcast_ref::<AppError>() {
            Some(app) => eprintln!("{}", app.user_message(locale)),
            None => eprintln!("Error: {err:#}"),
        }
        std::process::exit(1);
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
