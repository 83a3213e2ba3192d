//! Capsule archive export.
//!
//! Layout: `manifest.json`, `metadata.json`, `tasks/{id}.json`,
//! `reports/{execution_summary|security_report|quality_report|validation_results}.json`,
//! `project/{unified files}`, `README.md`. JSON is indented so re-exports of
//! identical capsules are byte-stable.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::domain::error::OrchestratorError;
use crate::domain::models::capsule::QLCapsule;
use crate::domain::ports::clock::Clock;

fn archive_error(e: zip::result::ZipError) -> OrchestratorError {
    OrchestratorError::Archive(e.to_string())
}

fn write_json<T: Serialize>(
    zip: &mut ZipWriter<File>,
    options: SimpleFileOptions,
    name: &str,
    value: &T,
) -> Result<(), OrchestratorError> {
    zip.start_file(name, options).map_err(archive_error)?;
    let bytes = serde_json::to_vec_pretty(value)?;
    zip.write_all(&bytes)?;
    Ok(())
}

/// Write the `.qlcapsule` archive and return its path.
pub fn export_capsule(
    output_dir: &Path,
    capsule: &QLCapsule,
    clock: &dyn Clock,
) -> Result<PathBuf, OrchestratorError> {
    std::fs::create_dir_all(output_dir)?;
    let stamp = clock.now().format("%Y%m%d_%H%M%S");
    let path = output_dir.join(format!(
        "ql_capsule_{}_{stamp}.qlcapsule",
        capsule.metadata.capsule_id
    ));

    let file = File::create(&path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    write_json(&mut zip, options, "manifest.json", &capsule.manifest)?;
    write_json(&mut zip, options, "metadata.json", &capsule.metadata)?;

    for (task, result) in capsule.tasks.iter().zip(&capsule.validation_results) {
        write_json(
            &mut zip,
            options,
            &format!("tasks/{}.json", task.id),
            &serde_json::json!({ "task": task, "validation_result": result }),
        )?;
    }

    write_json(
        &mut zip,
        options,
        "reports/execution_summary.json",
        &capsule.execution_summary,
    )?;
    write_json(
        &mut zip,
        options,
        "reports/security_report.json",
        &capsule.security_report,
    )?;
    write_json(
        &mut zip,
        options,
        "reports/quality_report.json",
        &capsule.quality_report,
    )?;
    write_json(
        &mut zip,
        options,
        "reports/validation_results.json",
        &capsule.validation_results,
    )?;

    if let Some(project) = &capsule.unified_project {
        for (file_path, content) in project {
            zip.start_file(format!("project/{file_path}"), options)
                .map_err(archive_error)?;
            zip.write_all(content.as_bytes())?;
        }
    }

    zip.start_file("README.md", options).map_err(archive_error)?;
    zip.write_all(readme_for(capsule).as_bytes())?;

    zip.finish().map_err(archive_error)?;
    Ok(path)
}

fn readme_for(capsule: &QLCapsule) -> String {
    let meta = &capsule.metadata;
    format!(
        r"# Capsule {id}

**Intent:** {intent}

| | |
|---|---|
| Status | {succeeded}/{total} tasks succeeded |
| Overall score | {overall}/100 |
| Quality score | {quality}/100 |
| Security risk | {risk} |
| Duration | {duration}s |

## Layout

- `metadata.json` — capsule identity and headline numbers
- `manifest.json` — full file listing
- `tasks/` — one record per executed task with its validation result
- `reports/` — execution, security and quality reports
- `project/` — the unified project tree
",
        id = meta.capsule_id,
        intent = meta.intent_text,
        succeeded = meta.successful_tasks,
        total = meta.total_tasks,
        overall = meta.overall_score,
        quality = meta.quality_score,
        risk = capsule.security_report.overall_risk_level,
        duration = meta.duration_secs,
    )
}
