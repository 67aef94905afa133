use crate::output::{print_json, print_table};
use anyhow::Context;
use converge_core::jenkins;
use converge_core::step::Verdict;

pub fn run(port: u16, keep_wizard: bool, platform: Option<&str>, json: bool) -> anyhow::Result<()> {
    let ctx = super::build_context(port, keep_wizard, platform)?;

    let plan = jenkins::build_sequence()
        .plan(&ctx)
        .context("failed to probe current state")?;

    if json {
        return print_json(&plan);
    }

    let rows: Vec<Vec<String>> = plan
        .iter()
        .map(|entry| {
            let action = match entry.verdict {
                Verdict::Satisfied => "in sync".to_string(),
                Verdict::Unsatisfied => "would apply".to_string(),
            };
            vec![entry.name.clone(), action]
        })
        .collect();
    print_table(&["STEP", "PLAN"], rows);

    let pending = plan
        .iter()
        .filter(|e| e.verdict == Verdict::Unsatisfied)
        .count();
    if pending == 0 {
        println!("\nNothing to do; host already converged.");
    } else {
        println!("\n{pending} step(s) would apply. Run: jenkinsctl install");
    }
    Ok(())
}
