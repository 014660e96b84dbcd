//! Progress bar and summary reporting for the CLI.

use console::style;
use indicatif::{HumanBytes, HumanDuration, ProgressBar, ProgressStyle};

use crate::{ArchiveProgress, ArchiveReport, CategoryListing, ImageRecord, Paginator};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Progress bar over the fetches of a bulk download.
pub struct ArchiveBar {
    bar: ProgressBar,
}

impl Default for ArchiveBar {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBar {
    /// Creates an empty bar; the length is set when the job starts.
    #[must_use]
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} wallpapers - {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━━╌"),
        );
        Self { bar }
    }

    /// Removes the bar if the job ended early.
    pub fn abandon(&self) {
        self.bar.finish_and_clear();
    }
}

impl ArchiveProgress for ArchiveBar {
    fn on_job_start(&self, category: &str, images: usize) {
        self.bar.set_length(images as u64);
        self.bar.set_message(format!("Downloading {category}..."));
        self.bar
            .enable_steady_tick(std::time::Duration::from_millis(250));
    }

    fn on_fetch_complete(&self, _position: usize, _bytes: u64) {
        self.bar.inc(1);
    }

    fn on_fetch_failed(&self, position: usize, error: &str) {
        self.bar.inc(1);
        self.bar.println(format!(
            "  {} wallpaper {position}: {error}",
            style("failed").red()
        ));
    }

    fn on_archive_written(&self, _report: &ArchiveReport) {
        self.bar.finish_and_clear();
    }
}

/// Prints the category list with one thumbnail each.
pub fn print_categories(listing: &CategoryListing) {
    if listing.categories.is_empty() {
        println!("No categories found.");
        return;
    }
    for category in &listing.categories {
        let thumb = listing
            .thumbnail(category)
            .map_or_else(|| style("(no image)").dim().to_string(), ToString::to_string);
        println!("  {:<24} {thumb}", style(category).bold());
    }
}

/// Prints the visible slice of a paginated listing.
pub fn print_page(title: &str, images: &[ImageRecord], pages: &Paginator) {
    let visible = pages.visible(images);
    println!("\n{SEPARATOR}");
    println!("{}", style(title).bold());
    println!("{SEPARATOR}");
    if visible.is_empty() {
        println!("  No wallpapers found.");
    }
    for image in visible {
        println!("  {} {}  {}", style(&image.id).dim(), image.name, image.image_url);
    }
    println!("{SEPARATOR}");
    println!(
        "  Page {} of {} ({} wallpapers)",
        pages.current_page(),
        pages.total_pages().max(1),
        images.len()
    );
    println!("{SEPARATOR}\n");
}

/// Prints the outcome of a bulk download.
pub fn print_report(report: &ArchiveReport) {
    println!("\n{SEPARATOR}");
    println!("Archive Summary");
    println!("{SEPARATOR}");
    println!("  Saved to:          {}", report.path.display());
    println!("  Wallpapers:        {}", report.entries);
    println!("  Archive size:      {}", HumanBytes(report.archive_size));
    println!("  Total time:        {}", HumanDuration(report.elapsed));
    if !report.failed.is_empty() {
        println!(
            "  Skipped:           {} ({})",
            report.failed.len(),
            report
                .failed
                .iter()
                .map(|(position, _)| position.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    println!("{SEPARATOR}");
}
