use std::io::Write;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mural::api::types::{Birthday, NewPost, Post, Reaction, ReactionKind, Vacation};
use mural::config::{CalendarCommand, Cli, Command, Config, FilesCommand};
use mural::error::ClientError;
use mural::feed::{FeedEvent, FeedSynchronizer, Visibility};
use mural::push::PushRegistrar;
use mural::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::debug!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    let state = AppState::bootstrap(config, data_dir).await?;
    state.subscribe_push().await;

    run(state, cli.command).await
}

async fn run(state: AppState, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Login { user, password } => {
            let password = resolve_password(password)?;
            match state.api.login(&user, &password).await {
                Ok(session) => {
                    println!("Logged in as {user} ({})", session.role);
                    state.subscribe_push().await;
                }
                Err(e) => fail(&e),
            }
        }
        Command::Logout => {
            state.session.clear()?;
            println!("Logged out");
        }
        Command::Register { user, password } => {
            let password = resolve_password(password)?;
            match state.api.register(&user, &password).await {
                Ok(()) => println!("Account {user} created; log in to continue"),
                Err(e) => fail(&e),
            }
        }
        Command::Posts => {
            let posts = state.api.posts().await?;
            print_posts(&posts);
        }
        Command::Post { title, body, image } => {
            let post = state
                .api
                .create_post(&NewPost {
                    title,
                    body,
                    image_path: image,
                })
                .await?;
            println!("Published {}", post.id);
        }
        Command::React { post_id, kind } => {
            let kind: ReactionKind = kind
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("expected one of: like, love, haha")?;
            state.api.react(&post_id, kind).await?;
            println!("Reacted with {kind}");
        }
        Command::Follow => follow(state).await?,
        Command::Files { action } => files(state, action).await?,
        Command::Birthdays { action } => match action {
            CalendarCommand::List => {
                for entry in state.api.birthdays().await? {
                    println!("{}  {}", entry.date, entry.name);
                }
            }
            CalendarCommand::Add { name, date, .. } => {
                let date = parse_date(&date)?;
                state.api.add_birthday(&Birthday { name, date }).await?;
                println!("Birthday added");
            }
        },
        Command::Vacations { action } => match action {
            CalendarCommand::List => {
                for entry in state.api.vacations().await? {
                    println!("{} .. {}  {}", entry.start, entry.end, entry.name);
                }
            }
            CalendarCommand::Add { name, date, end } => {
                let end = end.ok_or_else(|| anyhow::anyhow!("vacations need --end"))?;
                let vacation = Vacation {
                    name,
                    start: parse_date(&date)?,
                    end: parse_date(&end)?,
                };
                state.api.add_vacation(&vacation).await?;
                println!("Vacation added");
            }
        },
        Command::Subscribe => {
            let registrar =
                PushRegistrar::new(state.api.clone(), &state.config.push, &state.data_dir)?;
            match registrar.subscribe(state.worker.as_ref()).await {
                Ok(Some(subscription)) => println!("Subscribed: {}", subscription.endpoint),
                Ok(None) => {
                    println!("Subscription skipped (push disabled or cache worker inactive)")
                }
                Err(e) => fail(&e),
            }
        }
        Command::Shell { path } => {
            let fetched = state.api.fetch(&path).await?;
            let source = if fetched.from_cache { "cache" } else { "network" };
            eprintln!("{} {path} via {source}", fetched.status);
            std::io::stdout().lock().write_all(&fetched.body)?;
        }
    }
    Ok(())
}

/// Live feed: prints the current snapshot, then one line per delta.
/// SIGHUP stands in for the window coming back into view and forces a
/// full refresh.
async fn follow(state: AppState) -> anyhow::Result<()> {
    let mut sync = FeedSynchronizer::connect(state.api.clone(), &state.config.server).await?;
    print_posts(sync.posts());

    let mut hangup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())?;
    loop {
        tokio::select! {
            event = sync.next_event() => match event? {
                Some(event) => {
                    describe(&event);
                    sync.apply(event);
                }
                None => {
                    tracing::info!("delta channel closed by server");
                    break;
                }
            },
            _ = hangup.recv() => {
                // Marks the end of a backgrounded stretch.
                sync.observe_visibility(Visibility::Hidden).await?;
                if sync.observe_visibility(Visibility::Visible).await? {
                    print_posts(sync.posts());
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    sync.close().await?;
    Ok(())
}

async fn files(state: AppState, action: FilesCommand) -> anyhow::Result<()> {
    match action {
        FilesCommand::List => {
            for entry in state.api.files().await? {
                match entry.size {
                    Some(size) => println!("{:>10}  {}", size, entry.name),
                    None => println!("{:>10}  {}", "-", entry.name),
                }
            }
        }
        FilesCommand::Upload { path } => match state.api.upload_file(&path).await {
            Ok(()) => println!("Uploaded {}", path.display()),
            Err(e) => fail(&e),
        },
        FilesCommand::Download { name, output } => match state.api.download_file(&name).await {
            Ok(fetched) => {
                let target = output.unwrap_or_else(|| name.clone().into());
                tokio::fs::write(&target, &fetched.body).await?;
                println!("Saved {}", target.display());
            }
            Err(e) => fail(&e),
        },
    }
    Ok(())
}

fn describe(event: &FeedEvent) {
    match event {
        FeedEvent::NewPost(post) => println!("new: {}", post_line(post)),
        FeedEvent::ReactionUpdated(post) => {
            println!("update: {}", post_line(post))
        }
    }
}

fn print_posts(posts: &[Post]) {
    for post in posts {
        println!("{}", post_line(post));
    }
    println!("{} posts", posts.len());
}

fn post_line(post: &Post) -> String {
    let mut line = format!(
        "[{}] {}",
        post.created_at.format("%Y-%m-%d %H:%M"),
        post.title
    );
    let reactions = reaction_summary(&post.reactions);
    if !reactions.is_empty() {
        line.push_str(&format!("  ({reactions})"));
    }
    if !post.comments.is_empty() {
        line.push_str(&format!("  [{} comments]", post.comments.len()));
    }
    line
}

fn reaction_summary(reactions: &[Reaction]) -> String {
    let mut likes = 0;
    let mut loves = 0;
    let mut hahas = 0;
    for reaction in reactions {
        match reaction.kind {
            ReactionKind::Like => likes += 1,
            ReactionKind::Love => loves += 1,
            ReactionKind::Haha => hahas += 1,
        }
    }
    let mut parts = Vec::new();
    for (label, count) in [("like", likes), ("love", loves), ("haha", hahas)] {
        if count > 0 {
            parts.push(format!("{label}:{count}"));
        }
    }
    parts.join(" ")
}

fn parse_date(input: &str) -> anyhow::Result<NaiveDate> {
    input
        .parse()
        .with_context(|| format!("invalid date {input:?}, expected YYYY-MM-DD"))
}

fn resolve_password(password: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    eprint!("Password: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Prints the presentable message and exits. Transport detail has
/// already been logged further down the stack.
fn fail(error: &ClientError) -> ! {
    eprintln!("{}", error.user_message());
    std::process::exit(1);
}
