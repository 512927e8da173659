//! Output formatters for command results

use anyhow::Result;
use colored::*;
use labelcraft_core::{ExtractedLabels, GenerateError, GeneratedWorkbook, Workbook};
use std::path::Path;

use crate::OutputFormat;

pub fn print_generated(path: &Path, generated: &GeneratedWorkbook, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Human => {
            println!("{}", "✓ Workbook generated".green().bold());
            println!("  {} {}", "Output:".bold(), path.display());
            println!("  {} {}", "Sheets:".bold(), generated.sheet_count);
            println!("  {} {}", "QR codes:".bold(), generated.image_count);
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "file": path.display().to_string(),
                "fileName": generated.file_name,
                "contentType": generated.content_type(),
                "sheets": generated.sheet_count,
                "images": generated.image_count,
                "bytes": generated.bytes.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

pub fn print_written(path: &Path, bytes: usize, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Human => {
            println!("{}", "✓ Label QR codes added".green().bold());
            println!("  {} {}", "Output:".bold(), path.display());
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "file": path.display().to_string(),
                "bytes": bytes,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

pub fn print_failure(err: &GenerateError, format: OutputFormat) {
    match format {
        OutputFormat::Human => {
            let kind = if err.status_code() == 400 {
                "Invalid request:".yellow().bold()
            } else {
                "Generation failed:".red().bold()
            };
            eprintln!("{} {}", kind, err);
        }
        OutputFormat::Json => println!("{}", err.response_body()),
    }
}

pub fn print_extracted(template_id: Option<&str>, labels: &ExtractedLabels, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Human => {
            println!("{} {}", "Sheet:".bold(), labels.sheet.cyan().bold());
            println!();

            if !labels.global_data.is_empty() {
                println!("{}", "Global rows:".bold().underline());
                for row in &labels.global_data {
                    println!(
                        "  {} {}  {} {}",
                        row.label.as_deref().unwrap_or("(unlabeled)").yellow(),
                        show(row.data.as_deref()),
                        "qr:".bright_black(),
                        show(row.qr.as_deref())
                    );
                }
                println!();
            }

            for system in &labels.systems_data {
                println!("{} {}", "System:".bold(), system.system_name.cyan());
                for row in &system.rows {
                    println!(
                        "  [{}] {}  {} {}",
                        row.kind.as_deref().unwrap_or("-").bright_black(),
                        show(row.data.as_deref()),
                        "qr:".bright_black(),
                        show(row.qr.as_deref())
                    );
                }
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "templateId": template_id,
                "sheet": labels.sheet,
                "globalData": labels.global_data,
                "systemsData": labels.systems_data,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn show(value: Option<&str>) -> ColoredString {
    match value {
        Some(text) => text.normal(),
        None => "(blank)".bright_black(),
    }
}

pub fn print_inspection(file_path: &Path, workbook: &Workbook, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Human => {
            println!("{}", format!("Workbook: {}", file_path.display()).bold());
            println!();

            for sheet in workbook.sheets() {
                let state = if sheet.is_hidden() { " (hidden)".yellow() } else { "".normal() };
                println!("{} {}{}", "Sheet:".bold(), sheet.name().cyan().bold(), state);
                println!("  {} {}", "Rows:".bold(), sheet.rows().count());
                println!("  {} {}", "Columns:".bold(), sheet.columns().len());
                if sheet.has_drawing() {
                    println!("  {} yes", "Drawing:".bold());
                }
                if !sheet.merges().is_empty() {
                    let merges: Vec<String> = sheet.merges().iter().map(|m| m.to_string()).collect();
                    println!("  {} {}", "Merges:".bold(), merges.join(", "));
                }
                println!();
            }

            if !workbook.defined_names().is_empty() {
                println!("{}", "Defined names:".bold().underline());
                for name in workbook.defined_names() {
                    let scope = name
                        .local_sheet_id
                        .and_then(|id| workbook.sheet_at(id))
                        .map(|sheet| format!(" [{}]", sheet.name()))
                        .unwrap_or_default();
                    println!("  {}{} = {}", name.name.yellow(), scope.bright_black(), name.formula);
                }
            }
        }
        OutputFormat::Json => {
            let sheets: Vec<_> = workbook
                .sheets()
                .iter()
                .map(|sheet| {
                    serde_json::json!({
                        "name": sheet.name(),
                        "hidden": sheet.is_hidden(),
                        "rows": sheet.rows().count(),
                        "columns": sheet.columns().len(),
                        "drawing": sheet.has_drawing(),
                        "merges": sheet.merges().iter().map(|m| m.to_string()).collect::<Vec<_>>(),
                    })
                })
                .collect();
            let names: Vec<_> = workbook
                .defined_names()
                .iter()
                .map(|name| {
                    serde_json::json!({
                        "name": name.name,
                        "localSheetId": name.local_sheet_id,
                        "formula": name.formula,
                    })
                })
                .collect();
            let output = serde_json::json!({
                "file": file_path.display().to_string(),
                "sheets": sheets,
                "definedNames": names,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}
