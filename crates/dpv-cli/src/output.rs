//! Rendering reports to stdout

use dpv_pipeline::PackageReport;
use std::io::{self, Write};

/// Write the report as pretty JSON or as one summary line per resource plus its errors
pub fn print(report: &PackageReport, json: bool) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer_pretty(&mut out, report)?;
        writeln!(out)?;
    } else {
        render(report, &mut out)?;
    }
    Ok(())
}

fn render(report: &PackageReport, out: &mut impl Write) -> io::Result<()> {
    for resource in report.resources() {
        match &resource.file {
            Some(file) => writeln!(out, "[{file}] {}", resource.result.summary())?,
            None => writeln!(out, "{}", resource.result.summary())?,
        }
        for error in resource.result.errors() {
            writeln!(out, "  {error}")?;
        }
        for note in resource.result.skipped_relations() {
            writeln!(out, "  skipped: {note}")?;
        }
    }

    let total = report.resources().len();
    let invalid = report.invalid_resources().len();
    let name = report.package().unwrap_or("package");
    if invalid == 0 {
        writeln!(out, "{name}: all {total} resources valid")
    } else {
        writeln!(
            out,
            "{name}: {invalid} of {total} resources invalid, {} errors",
            report.error_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpv_validation::{ErrorKind, ValidationError, ValidationResult};

    #[test]
    fn test_render_lists_errors_under_summary() {
        let mut people = ValidationResult::new("people");
        people.push(
            ValidationError::row_level(2, ErrorKind::DuplicateKey, "Duplicate key (1)")
                .with_related_row(1),
        );
        let report = PackageReport::new(Some("demo".into()), vec![people]);

        let mut out = Vec::new();
        render(&report, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines[0], "people: invalid, 1 errors in 0 rows");
        assert_eq!(lines[1], "  row 2: [DUPLICATE_KEY] Duplicate key (1)");
        assert_eq!(lines[2], "demo: 1 of 1 resources invalid, 1 errors");
    }

    #[test]
    fn test_render_bundle_files() {
        let report = PackageReport::from_bundle(
            None,
            vec![("services".to_string(), ValidationResult::new("service"))],
        );
        let mut out = Vec::new();
        render(&report, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("[services] service: valid (0 rows)\n"));
        assert!(text.ends_with("package: all 1 resources valid\n"));
    }

    #[test]
    fn test_render_shows_skipped_relations() {
        let mut service = ValidationResult::new("service");
        service.skip_relation("service(organization_id) -> organization(id) not checked");
        let report = PackageReport::new(None, vec![service]);

        let mut out = Vec::new();
        render(&report, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("service: valid (0 rows)"));
        assert!(text.contains("  skipped: service(organization_id) -> organization(id) not checked"));
        assert!(text.ends_with("package: all 1 resources valid\n"));
    }
}
