//! CLI mode for wallpaper - browse and download wallpapers from the terminal.

mod progress;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use console::style;
use tokio_util::sync::CancellationToken;

use crate::account::{self, SignUpForm};
use crate::{
    AppConfig, ArchiveDownloader, AuthGate, CatalogClient, CategoryBrowser, FailurePolicy,
    FileStore, Gated, HttpCatalog, ImageRecord, NewImage, Paginator, PreviewModal,
    TokioFileSystem, download_single, GALLERY_PAGE_SIZE, WALLPAPERS_PAGE_SIZE,
};

use progress::{ArchiveBar, print_categories, print_page, print_report};

/// Environment variable holding the account password for `login`/`register`.
const PASSWORD_ENV: &str = "WALLPAPER_PASSWORD";

/// Environment variable holding the upload gate password.
const UPLOAD_PASSWORD_ENV: &str = "WALLPAPER_UPLOAD_PASSWORD";

type Gate = AuthGate<Arc<FileStore>>;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Categories { refresh: bool },
    Images { category: String, page: Option<usize> },
    All { page: Option<usize> },
    Download { category: String, skip_failed: bool },
    Get { category: String, id: String },
    Share { category: String, id: String },
    Login { email: String },
    Register { name: String, email: String },
    Logout,
    Upload(NewImage),
    Help,
}

#[derive(Debug, PartialEq, Eq)]
struct Invocation {
    command: Command,
    output: Option<PathBuf>,
    force: bool,
}

fn parse_args(args: &[String]) -> Result<Invocation, String> {
    let mut positional = Vec::new();
    let mut page = None;
    let mut output = None;
    let mut refresh = false;
    let mut skip_failed = false;
    let mut force = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--page" | "-p" => {
                i += 1;
                let raw = args.get(i).ok_or("--page needs a number")?;
                page = Some(
                    raw.parse::<usize>()
                        .map_err(|_| format!("invalid page number: {raw}"))?,
                );
            }
            "-o" | "--output" => {
                i += 1;
                output = Some(PathBuf::from(args.get(i).ok_or("--output needs a directory")?));
            }
            "--refresh" => refresh = true,
            "--skip-failed" => skip_failed = true,
            "-f" | "--force" => force = true,
            "-h" | "--help" => {
                return Ok(Invocation {
                    command: Command::Help,
                    output,
                    force,
                });
            }
            arg if !arg.starts_with('-') => positional.push(arg.to_string()),
            arg => return Err(format!("Unknown option: {arg}")),
        }
        i += 1;
    }

    let Some((name, rest)) = positional.split_first() else {
        return Ok(Invocation {
            command: Command::Help,
            output,
            force,
        });
    };
    let command = match (name.as_str(), rest) {
        ("categories", []) => Command::Categories { refresh },
        ("images", [category]) => Command::Images {
            category: category.clone(),
            page,
        },
        ("all", []) => Command::All { page },
        ("download", [category]) => Command::Download {
            category: category.clone(),
            skip_failed,
        },
        ("get", [category, id]) => Command::Get {
            category: category.clone(),
            id: id.clone(),
        },
        ("share", [category, id]) => Command::Share {
            category: category.clone(),
            id: id.clone(),
        },
        ("login", [email]) => Command::Login {
            email: email.clone(),
        },
        ("register", [name, email]) => Command::Register {
            name: name.clone(),
            email: email.clone(),
        },
        ("logout", []) => Command::Logout,
        ("upload", [image_name, image_url, download_url, category]) => Command::Upload(NewImage {
            image_name: image_name.clone(),
            image_url: image_url.clone(),
            download_url: download_url.clone(),
            category: category.clone(),
        }),
        (other, _) => return Err(format!("Unknown command or wrong arguments: {other}")),
    };
    Ok(Invocation {
        command,
        output,
        force,
    })
}

fn print_usage() {
    eprintln!("Usage: wallpaper [OPTIONS] <COMMAND>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  categories [--refresh]                  List categories with thumbnails");
    eprintln!("  images <category> [--page N]            List a category, {GALLERY_PAGE_SIZE} per page");
    eprintln!("  all [--page N]                          List every wallpaper, {WALLPAPERS_PAGE_SIZE} per page");
    eprintln!("  download <category> [--skip-failed]     Save a whole category as one zip");
    eprintln!("  get <category> <id>                     Download one wallpaper");
    eprintln!("  share <category> <id>                   Copy a wallpaper link to the clipboard");
    eprintln!("  login <email>                           Sign in (password from {PASSWORD_ENV})");
    eprintln!("  register <name> <email>                 Create an account (password from {PASSWORD_ENV})");
    eprintln!("  logout                                  Sign out");
    eprintln!("  upload <name> <image-url> <download-url> <category>");
    eprintln!("                                          Add a wallpaper (needs the upload password)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -o, --output <DIR>   Download directory (default from config)");
    eprintln!("  -f, --force          Overwrite existing files");
    eprintln!("  -h, --help           Show this help message");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RUST_LOG             Log level (default: warn)");
    eprintln!("  WALLPAPER_API_URL    Backend base URL");
}

fn password_from_env() -> crate::Result<String> {
    env::var(PASSWORD_ENV).map_err(|_| {
        crate::Error::Config(format!("{PASSWORD_ENV} environment variable not set"))
    })
}

fn prompt_sign_in() {
    eprintln!(
        "{} Sign up or sign in first: wallpaper login <email>",
        style("Authentication required.").yellow()
    );
}

async fn find_image(
    client: &HttpCatalog,
    category: &str,
    id: &str,
) -> crate::Result<ImageRecord> {
    client
        .images_in_category(category)
        .await?
        .into_iter()
        .find(|image| image.id == id)
        .ok_or_else(|| crate::Error::validation("id", format!("no wallpaper {id} in {category}")))
}

/// Runs the CLI with the process arguments.
///
/// # Errors
///
/// Returns an error if the command fails.
pub async fn run() -> crate::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let invocation = match parse_args(&args) {
        Ok(invocation) => invocation,
        Err(message) => {
            print_usage();
            return Err(crate::Error::validation("arguments", message));
        }
    };
    if invocation.command == Command::Help {
        print_usage();
        return Ok(());
    }

    let mut config = AppConfig::load()?;
    if let Some(dir) = invocation.output {
        config.paths.download_dir = dir;
    }
    if invocation.force {
        config.download.force_overwrite = true;
    }

    let store = Arc::new(FileStore::open(config.paths.store_path())?);
    let gate = AuthGate::new(Arc::clone(&store));
    let client = HttpCatalog::from_config(&config.api)?;

    execute(invocation.command, &config, &client, &gate).await
}

async fn execute(
    command: Command,
    config: &AppConfig,
    client: &HttpCatalog,
    gate: &Gate,
) -> crate::Result<()> {
    let store = gate.store().as_ref();
    match command {
        Command::Categories { refresh } => {
            let browser = CategoryBrowser::new(client, store, config.cache.ttl());
            if refresh {
                browser.invalidate()?;
            }
            print_categories(&browser.load().await?);
        }
        Command::Images { category, page } => {
            let images = client.images_in_category(&category).await?;
            let mut pages = Paginator::new(images.len(), GALLERY_PAGE_SIZE);
            pages.set_page(page.unwrap_or(1));
            print_page(&category, &images, &pages);
        }
        Command::All { page } => {
            let images = client.all_images().await?;
            let mut pages = Paginator::new(images.len(), WALLPAPERS_PAGE_SIZE);
            match page {
                Some(n) => pages.set_page(n),
                None => pages.restore(store),
            };
            pages.save(store)?;
            print_page("All Wallpapers", &images, &pages);
        }
        Command::Download {
            category,
            skip_failed,
        } => {
            let mut download = config.download.clone();
            if skip_failed {
                download = download.with_failure_policy(FailurePolicy::Skip);
            }
            download_category(client, gate, &category, download, config).await?;
        }
        Command::Get { category, id } => {
            let image = find_image(client, &category, &id).await?;
            let outcome = download_single(
                gate,
                client,
                &TokioFileSystem,
                &image.download_url,
                &config.paths.download_dir,
                config.download.force_overwrite,
            )
            .await?;
            match outcome {
                Gated::Proceeded(path) => println!("Saved {}", path.display()),
                Gated::PromptAuth => prompt_sign_in(),
            }
        }
        Command::Share { category, id } => {
            let image = find_image(client, &category, &id).await?;
            share(gate, &image)?;
        }
        Command::Login { email } => {
            let password = password_from_env()?;
            account::sign_in(client, gate, &email, &password).await?;
            println!("Signed in as {email}.");
        }
        Command::Register { name, email } => {
            let form = SignUpForm::new(name, email, password_from_env()?);
            account::sign_up(client, &form).await?;
            println!("Account created. Sign in with: wallpaper login {}", form.email);
        }
        Command::Logout => {
            account::sign_out(gate)?;
            println!("Signed out.");
        }
        Command::Upload(image) => {
            let configured = config.api.upload_password.as_deref();
            if !account::upload_unlocked(store, configured) {
                let entered = env::var(UPLOAD_PASSWORD_ENV).map_err(|_| {
                    crate::Error::Config(format!(
                        "upload is locked; set {UPLOAD_PASSWORD_ENV}"
                    ))
                })?;
                account::unlock_upload(store, &entered, configured)?;
            }
            client.create_images(std::slice::from_ref(&image)).await?;
            println!("Added {} to {}.", image.image_name, image.category);
        }
        Command::Help => print_usage(),
    }
    Ok(())
}

async fn download_category(
    client: &HttpCatalog,
    gate: &Gate,
    category: &str,
    download: crate::DownloadConfig,
    config: &AppConfig,
) -> crate::Result<()> {
    // Listing is public; only the archive job is gated.
    if !gate.is_authenticated() {
        prompt_sign_in();
        return Ok(());
    }

    let images = client.images_in_category(category).await?;
    let downloader = ArchiveDownloader::new(client, download);
    let bar = ArchiveBar::new();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let result = downloader
        .download_all(
            gate,
            category,
            &images,
            &config.paths.download_dir,
            &bar,
            Some(&cancel),
        )
        .await;
    watcher.abort();

    match result {
        Ok(Gated::Proceeded(report)) => {
            print_report(&report);
            Ok(())
        }
        Ok(Gated::PromptAuth) => {
            prompt_sign_in();
            Ok(())
        }
        Err(e) => {
            bar.abandon();
            Err(e)
        }
    }
}

#[cfg(feature = "clipboard")]
fn share(gate: &Gate, image: &ImageRecord) -> crate::Result<()> {
    let mut modal = PreviewModal::new();
    if modal.open(gate, image).is_prompt() {
        prompt_sign_in();
        return Ok(());
    }
    let mut clipboard = crate::SystemClipboard::new()?;
    modal.share(&mut clipboard, std::time::Instant::now())?;
    println!("{} {}", style("Link copied:").green(), image.image_url);
    Ok(())
}

#[cfg(not(feature = "clipboard"))]
fn share(gate: &Gate, image: &ImageRecord) -> crate::Result<()> {
    let mut modal = PreviewModal::new();
    if modal.open(gate, image).is_prompt() {
        prompt_sign_in();
        return Ok(());
    }
    println!("{}", image.image_url);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_download_with_flags() {
        let parsed = parse_args(&args(&["download", "Nature", "--skip-failed", "-o", "out"])).unwrap();
        assert_eq!(
            parsed.command,
            Command::Download {
                category: "Nature".into(),
                skip_failed: true
            }
        );
        assert_eq!(parsed.output, Some(PathBuf::from("out")));
        assert!(!parsed.force);
    }

    #[test]
    fn parses_page_numbers() {
        let parsed = parse_args(&args(&["all", "--page", "3"])).unwrap();
        assert_eq!(parsed.command, Command::All { page: Some(3) });
        assert!(parse_args(&args(&["all", "--page", "x"])).is_err());
        assert!(parse_args(&args(&["all", "--page"])).is_err());
    }

    #[test]
    fn parses_upload_fields_in_order() {
        let parsed = parse_args(&args(&[
            "upload",
            "Dune",
            "https://cdn.example.com/d.jpg",
            "https://cdn.example.com/d-full.jpg",
            "Nature",
        ]))
        .unwrap();
        let Command::Upload(image) = parsed.command else {
            panic!("expected upload");
        };
        assert_eq!(image.image_name, "Dune");
        assert_eq!(image.download_url, "https://cdn.example.com/d-full.jpg");
        assert_eq!(image.category, "Nature");
    }

    #[test]
    fn no_arguments_or_help_shows_usage() {
        assert_eq!(parse_args(&[]).unwrap().command, Command::Help);
        assert_eq!(parse_args(&args(&["images", "-h"])).unwrap().command, Command::Help);
    }

    #[test]
    fn rejects_unknown_input() {
        assert!(parse_args(&args(&["frobnicate"])).is_err());
        assert!(parse_args(&args(&["images"])).is_err());
        assert!(parse_args(&args(&["categories", "--bogus"])).is_err());
    }
}
