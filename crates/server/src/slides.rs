//! Slide deck conversion pipeline and reaction auto-flagging.
//!
//! Conversion runs on a detached task after the upload response is sent:
//! normalize to PDF with the office converter, rasterize pages with the PDF
//! renderer, then publish the image set in one rename so viewers never see a
//! partial deck. Any stage failure marks the deck `failed` and leaves
//! `slide_count` at zero; nothing is retried automatically.

use anyhow::{anyhow, bail, Context, Result};
use shared::{ConversionStatus, ReactionCounts};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;

use crate::config::SlidesConfig;
use crate::db::{Database, SlideBookmark, SlideDeck};
use crate::storage::FileStorage;

/// Kick off conversion for a freshly uploaded deck. Fire-and-forget: the
/// uploader polls the deck's `conversion_status`.
pub fn spawn_conversion(
    db: Database,
    storage: FileStorage,
    config: SlidesConfig,
    deck_id: String,
    source: PathBuf,
) {
    tokio::spawn(async move {
        let result = run_conversion(&db, &storage, &config, &deck_id, &source).await;
        let _ = fs::remove_file(&source).await;
        let _ = fs::remove_dir_all(storage.staging_dir(&deck_id)).await;

        match result {
            Ok(count) => {
                tracing::info!("deck {} converted: {} slides", deck_id, count);
                if let Err(e) = db.mark_deck_ready(&deck_id, count).await {
                    tracing::error!("failed to mark deck {} ready: {}", deck_id, e);
                }
            }
            Err(e) => {
                tracing::warn!("deck {} conversion failed: {}", deck_id, e);
                let _ = db
                    .set_deck_status(
                        &deck_id,
                        ConversionStatus::Failed.as_str(),
                        Some(&e.to_string()),
                    )
                    .await;
            }
        }
    });
}

async fn run_conversion(
    db: &Database,
    storage: &FileStorage,
    config: &SlidesConfig,
    deck_id: &str,
    source: &Path,
) -> Result<i64> {
    db.set_deck_status(deck_id, ConversionStatus::Converting.as_str(), None)
        .await?;

    let stage_root = storage.staging_dir(deck_id);
    let pages_dir = stage_root.join("pages");
    fs::create_dir_all(&pages_dir).await?;

    let pdf_path = normalize_to_pdf(config, source, &stage_root).await?;
    let count = rasterize_pdf(config, &pdf_path, &pages_dir).await?;

    if count == 0 {
        bail!("document produced no pages");
    }
    if count > config.max_slides {
        bail!(
            "deck has {} slides; at most {} are supported",
            count,
            config.max_slides
        );
    }

    storage.publish_deck(deck_id, &pages_dir).await?;
    Ok(count as i64)
}

/// Stage 1: office documents go through the external converter; PDFs pass
/// straight through.
async fn normalize_to_pdf(
    config: &SlidesConfig,
    source: &Path,
    out_dir: &Path,
) -> Result<PathBuf> {
    let is_pdf = source
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if is_pdf {
        return Ok(source.to_path_buf());
    }

    let mut command = Command::new(&config.soffice_bin);
    command
        .arg("--headless")
        .arg("--convert-to")
        .arg("pdf")
        .arg("--outdir")
        .arg(out_dir)
        .arg(source);
    let output = run_with_timeout(&mut command, config.convert_timeout_secs)
        .await
        .context("document converter failed to run")?;

    if !output.status.success() {
        bail!(
            "document conversion failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    // The converter names the output after the input; take whatever PDF landed
    let mut entries = fs::read_dir(out_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("pdf") {
            return Ok(path);
        }
    }
    Err(anyhow!("converter produced no PDF output"))
}

/// Stage 2: rasterize each PDF page to `<n>.png`, zero-based and ordered.
async fn rasterize_pdf(config: &SlidesConfig, pdf: &Path, pages_dir: &Path) -> Result<usize> {
    let prefix = pages_dir.join("page");
    let mut command = Command::new(&config.pdftoppm_bin);
    command.arg("-png").arg("-r").arg("150").arg(pdf).arg(&prefix);
    let output = run_with_timeout(&mut command, config.convert_timeout_secs)
        .await
        .context("PDF renderer failed to run")?;

    if !output.status.success() {
        bail!(
            "PDF rendering failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    // Renderer output is `page-1.png` .. `page-N.png` (width-padded); collect,
    // order by page number, rename to the stable zero-based scheme.
    let mut pages: Vec<(u32, PathBuf)> = Vec::new();
    let mut entries = fs::read_dir(pages_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(number) = name
            .strip_prefix("page-")
            .and_then(|rest| rest.strip_suffix(".png"))
            .and_then(|digits| digits.parse::<u32>().ok())
        {
            pages.push((number, path));
        }
    }
    pages.sort_by_key(|(number, _)| *number);

    for (index, (_, path)) in pages.iter().enumerate() {
        fs::rename(path, pages_dir.join(format!("{}.png", index))).await?;
    }

    Ok(pages.len())
}

async fn run_with_timeout(
    command: &mut Command,
    timeout_secs: u64,
) -> Result<std::process::Output> {
    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), command.output())
        .await
        .map_err(|_| anyhow!("external converter timed out after {}s", timeout_secs))??;
    Ok(output)
}

// ============================================================================
// Reaction auto-flagging
// ============================================================================

/// Decide whether a slide's reaction aggregate crosses the deck's
/// auto-bookmark thresholds. Returns the human-readable reason when it does.
pub fn evaluate_flag(
    threshold_count: i64,
    threshold_rate: f64,
    counts: &ReactionCounts,
) -> Option<String> {
    let problem = counts.problem();
    let total = counts.total();

    if problem >= threshold_count {
        return Some(format!(
            "{} students marked this slide hard or asked a question (threshold {})",
            problem, threshold_count
        ));
    }
    if total > 0 && (problem as f64 / total as f64) >= threshold_rate {
        return Some(format!(
            "{}% of reactions report trouble (threshold {}%)",
            (problem * 100) / total,
            (threshold_rate * 100.0) as i64
        ));
    }
    None
}

/// Reconcile the stored bookmark with a freshly computed aggregate: set the
/// auto flag when the threshold is crossed, clear it (or drop the row, if no
/// manual flag holds it) when the aggregate falls back under.
pub async fn update_auto_flag(
    db: &Database,
    deck: &SlideDeck,
    slide_index: i64,
    counts: &ReactionCounts,
) -> Result<(bool, Option<String>)> {
    let reason = evaluate_flag(deck.flag_threshold_count, deck.flag_threshold_rate, counts);
    let existing = db.get_bookmark(&deck.id, slide_index).await?;

    match (&reason, existing) {
        (Some(reason), Some(mut bookmark)) => {
            bookmark.is_auto = true;
            bookmark.reason = Some(reason.clone());
            db.upsert_bookmark(&bookmark).await?;
        }
        (Some(reason), None) => {
            db.upsert_bookmark(&SlideBookmark {
                id: uuid::Uuid::new_v4().to_string(),
                deck_id: deck.id.clone(),
                slide_index,
                is_auto: true,
                is_manual: false,
                reason: Some(reason.clone()),
                memo: None,
                supplement_url: None,
                updated_at: None,
            })
            .await?;
        }
        (None, Some(bookmark)) if bookmark.is_auto && !bookmark.is_manual => {
            db.delete_bookmark(&deck.id, slide_index).await?;
        }
        (None, Some(mut bookmark)) if bookmark.is_auto => {
            bookmark.is_auto = false;
            bookmark.reason = None;
            db.upsert_bookmark(&bookmark).await?;
        }
        (None, _) => {}
    }

    let flagged = reason.is_some()
        || db
            .get_bookmark(&deck.id, slide_index)
            .await?
            .map(|b| b.is_manual)
            .unwrap_or(false);
    Ok((flagged, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(understood: i64, question: i64, hard: i64) -> ReactionCounts {
        ReactionCounts {
            understood,
            question,
            hard,
        }
    }

    #[test]
    fn test_flag_on_absolute_count() {
        assert!(evaluate_flag(3, 0.5, &counts(10, 2, 1)).is_some());
        assert!(evaluate_flag(3, 0.5, &counts(10, 1, 1)).is_none());
    }

    #[test]
    fn test_flag_on_rate() {
        // 2 of 4 reactions report trouble at a 0.5 threshold
        assert!(evaluate_flag(10, 0.5, &counts(2, 1, 1)).is_some());
        // 1 of 4 stays under
        assert!(evaluate_flag(10, 0.5, &counts(3, 1, 0)).is_none());
    }

    #[test]
    fn test_no_flag_without_reactions() {
        assert!(evaluate_flag(3, 0.5, &counts(0, 0, 0)).is_none());
    }

    fn test_deck(id: &str) -> SlideDeck {
        SlideDeck {
            id: id.to_string(),
            session_id: "sess-1".to_string(),
            file_name: "week1.pdf".to_string(),
            conversion_status: "ready".to_string(),
            conversion_error: None,
            slide_count: 10,
            current_slide_index: 0,
            flag_threshold_count: 2,
            flag_threshold_rate: 0.5,
            estimated_minutes: None,
            created_at: None,
        }
    }

    async fn deck_fixture(db: &Database) -> SlideDeck {
        let deck = test_deck("deck-1");
        db.create_user(&crate::db::User {
            id: "u1".to_string(),
            username: "teach".to_string(),
            email: "teach@example.com".to_string(),
            password_hash: "h".to_string(),
            role: "instructor".to_string(),
            created_at: None,
        })
        .await
        .unwrap();
        db.create_session(&crate::db::Session {
            id: "sess-1".to_string(),
            subject_id: None,
            title: "Week 1".to_string(),
            description: None,
            session_type: "live".to_string(),
            instructor_id: "u1".to_string(),
            invite_code: "CODE1234".to_string(),
            week_number: None,
            live_status: Some("preparing".to_string()),
            current_checkpoint_id: None,
            attendance_start: None,
            attendance_end: None,
            late_allowed: false,
            late_end: None,
            assignment_due_date: None,
            quiz_time_limit_minutes: None,
            video_url: None,
            material_file: None,
            deleted_at: None,
            created_at: None,
            updated_at: None,
        })
        .await
        .unwrap();
        db.create_slide_deck(&deck).await.unwrap();
        deck
    }

    #[tokio::test]
    async fn test_auto_flag_lifecycle() {
        let db = Database::new_in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        let deck = deck_fixture(&db).await;

        // crossing the count threshold creates an auto bookmark
        let (flagged, reason) = update_auto_flag(&db, &deck, 4, &counts(1, 1, 1))
            .await
            .unwrap();
        assert!(flagged);
        assert!(reason.is_some());
        let bookmark = db.get_bookmark(&deck.id, 4).await.unwrap().unwrap();
        assert!(bookmark.is_auto);
        assert!(!bookmark.is_manual);

        // dropping back under clears the auto-only bookmark entirely
        let (flagged, reason) = update_auto_flag(&db, &deck, 4, &counts(5, 0, 0))
            .await
            .unwrap();
        assert!(!flagged);
        assert!(reason.is_none());
        assert!(db.get_bookmark(&deck.id, 4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reaction_upsert_is_latest_write_wins() {
        let db = Database::new_in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        let deck = deck_fixture(&db).await;
        for id in ["student-1", "student-2"] {
            db.create_user(&crate::db::User {
                id: id.to_string(),
                username: id.to_string(),
                email: format!("{}@example.com", id),
                password_hash: "h".to_string(),
                role: "student".to_string(),
                created_at: None,
            })
            .await
            .unwrap();
        }

        db.upsert_reaction(&deck.id, "student-1", 0, "understood")
            .await
            .unwrap();
        db.upsert_reaction(&deck.id, "student-1", 0, "hard")
            .await
            .unwrap();
        db.upsert_reaction(&deck.id, "student-2", 0, "question")
            .await
            .unwrap();

        // student-1's second reaction replaced the first
        let counts = db.count_reactions(&deck.id, 0).await.unwrap();
        assert_eq!(counts.understood, 0);
        assert_eq!(counts.hard, 1);
        assert_eq!(counts.question, 1);
        assert_eq!(counts.total(), 2);

        // clearing removes the row entirely
        db.delete_reaction(&deck.id, "student-1", 0).await.unwrap();
        let counts = db.count_reactions(&deck.id, 0).await.unwrap();
        assert_eq!(counts.total(), 1);
    }

    #[tokio::test]
    async fn test_auto_flag_preserves_manual_bookmark() {
        let db = Database::new_in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
        let deck = deck_fixture(&db).await;

        db.upsert_bookmark(&SlideBookmark {
            id: uuid::Uuid::new_v4().to_string(),
            deck_id: deck.id.clone(),
            slide_index: 2,
            is_auto: false,
            is_manual: true,
            reason: None,
            memo: Some("revisit".to_string()),
            supplement_url: None,
            updated_at: None,
        })
        .await
        .unwrap();

        // threshold crossed: bookmark gains the auto flag
        update_auto_flag(&db, &deck, 2, &counts(0, 2, 1)).await.unwrap();
        let bookmark = db.get_bookmark(&deck.id, 2).await.unwrap().unwrap();
        assert!(bookmark.is_auto && bookmark.is_manual);

        // aggregate falls back: manual bookmark survives, auto flag cleared
        let (flagged, _) = update_auto_flag(&db, &deck, 2, &counts(6, 0, 0))
            .await
            .unwrap();
        assert!(flagged, "manual bookmark keeps the slide flagged");
        let bookmark = db.get_bookmark(&deck.id, 2).await.unwrap().unwrap();
        assert!(!bookmark.is_auto && bookmark.is_manual);
        assert_eq!(bookmark.memo.as_deref(), Some("revisit"));
    }
}
