use converge_core::sequence::RunReport;
use converge_core::step::{Outcome, StepReport};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    // Calculate column widths
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  "));

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  "));
    }
}

pub fn outcome_label(step: &StepReport) -> String {
    match (step.outcome, step.forced) {
        (Outcome::Skipped, _) => "skipped (already satisfied)".to_string(),
        (Outcome::Applied, true) => "applied (notified)".to_string(),
        (Outcome::Applied, false) => "applied".to_string(),
        (Outcome::Failed, _) => "FAILED".to_string(),
    }
}

pub fn print_run_report(report: &RunReport) {
    let rows: Vec<Vec<String>> = report
        .steps
        .iter()
        .map(|s| {
            vec![
                s.name.clone(),
                outcome_label(s),
                s.message.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["STEP", "OUTCOME", "DETAIL"], rows);
}
