//! Web asset build
//!
//! Produces the tree that ends up in the filesystem image:
//! - `*.css` and `*.js` are minified to `<stem>.min.css` / `<stem>.min.js`
//! - images are copied as-is
//! - `*.html` is copied with its `.css"` / `.js"` references pointed at the
//!   minified files

mod minify;

use anyhow::{Context, Result};
use clap::Subcommand;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub use minify::{CssMinifier, JsMinifier, Minifier};

const IMAGE_EXTENSIONS: &[&str] = &["svg", "png", "jpg", "jpeg", "gif", "ico", "webp"];

#[derive(Subcommand)]
pub enum WwwAction {
    /// Clean the output tree and rebuild all assets
    Build,
    /// Remove the output tree
    Clean,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    pub css: usize,
    pub js: usize,
    pub images: usize,
    pub html: usize,
}

/// Remove `dest` if it exists.
pub fn clean(dest: &Path) -> Result<()> {
    if dest.exists() {
        fs::remove_dir_all(dest)
            .with_context(|| format!("failed to remove {}", dest.display()))?;
        info!("Cleaned {}", dest.display());
    } else {
        info!("{} does not exist", dest.display());
    }
    Ok(())
}

pub fn minify_css(src: &Path, dest: &Path, minifier: &dyn Minifier) -> Result<usize> {
    minify_ext(src, dest, "css", minifier)
}

pub fn minify_js(src: &Path, dest: &Path, minifier: &dyn Minifier) -> Result<usize> {
    minify_ext(src, dest, "js", minifier)
}

fn minify_ext(src: &Path, dest: &Path, ext: &str, minifier: &dyn Minifier) -> Result<usize> {
    let mut count = 0;
    for file in files_under(src)? {
        if !has_extension(&file, &[ext]) {
            continue;
        }
        let content = fs::read_to_string(&file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        let rel = file.strip_prefix(src).context("failed to compute relative path")?;
        let stem = rel
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let out = dest
            .join(rel.parent().unwrap_or(Path::new("")))
            .join(format!("{stem}.min.{ext}"));
        write_file(&out, minifier.minify(&content).as_bytes())?;
        info!("Minified {} -> {}", file.display(), out.display());
        count += 1;
    }
    Ok(count)
}

pub fn copy_images(src: &Path, dest: &Path) -> Result<usize> {
    let mut count = 0;
    for file in files_under(src)? {
        if !has_extension(&file, IMAGE_EXTENSIONS) {
            continue;
        }
        let out = dest.join(file.strip_prefix(src).context("failed to compute relative path")?);
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::copy(&file, &out)
            .with_context(|| format!("failed to copy {} -> {}", file.display(), out.display()))?;
        info!("Copied {} -> {}", file.display(), out.display());
        count += 1;
    }
    Ok(count)
}

pub fn process_html(src: &Path, dest: &Path) -> Result<usize> {
    let mut count = 0;
    for file in files_under(src)? {
        if !has_extension(&file, &["html"]) {
            continue;
        }
        let content = fs::read_to_string(&file)
            .with_context(|| format!("failed to read {}", file.display()))?;
        let out = dest.join(file.strip_prefix(src).context("failed to compute relative path")?);
        write_file(&out, rewrite_references(&content).as_bytes())?;
        info!("Processed {} -> {}", file.display(), out.display());
        count += 1;
    }
    Ok(count)
}

/// Point quoted `.css` / `.js` references at the minified files.
pub fn rewrite_references(html: &str) -> String {
    html.replace(".css\"", ".min.css\"")
        .replace(".js\"", ".min.js\"")
}

/// Clean `dest` and run every asset step.
pub fn build(
    src: &Path,
    dest: &Path,
    css: &dyn Minifier,
    js: &dyn Minifier,
) -> Result<BuildSummary> {
    if !src.is_dir() {
        anyhow::bail!("asset source directory {} does not exist", src.display());
    }
    clean(dest)?;
    let summary = BuildSummary {
        css: minify_css(src, dest, css)?,
        js: minify_js(src, dest, js)?,
        images: copy_images(src, dest)?,
        html: process_html(src, dest)?,
    };
    info!(
        "Build complete: {} css, {} js, {} images, {} html",
        summary.css, summary.js, summary.images, summary.html
    );
    Ok(summary)
}

pub fn run(action: WwwAction, src: &Path, dest: &Path) -> Result<()> {
    match action {
        WwwAction::Build => build(src, dest, &CssMinifier, &JsMinifier).map(|_| ()),
        WwwAction::Clean => clean(dest),
    }
}

fn files_under(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.context("Failed to walk directory")?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| exts.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_quoted_references_only() {
        let html = r#"<link href="css/site.css"><script src="app.js"></script><p>style.css</p>"#;
        assert_eq!(
            rewrite_references(html),
            r#"<link href="css/site.min.css"><script src="app.min.js"></script><p>style.css</p>"#
        );
    }

    #[test]
    fn extension_match_ignores_case() {
        assert!(has_extension(Path::new("logo.PNG"), IMAGE_EXTENSIONS));
        assert!(!has_extension(Path::new("notes.txt"), IMAGE_EXTENSIONS));
        assert!(!has_extension(Path::new("Makefile"), IMAGE_EXTENSIONS));
    }
}
