use pomofy_core::display::format_clock;
use pomofy_core::SessionKind;
use serde::Serialize;

use super::open_store;

#[derive(Serialize)]
struct SlotRow<'a> {
    index: usize,
    kind: SessionKind,
    label: &'a str,
    duration_secs: u64,
}

pub fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let settings = open_store()?.load();
    let validated = settings.validate()?;
    let plan = &validated.plan;

    let mut rows = Vec::with_capacity(plan.len());
    for (index, kind) in plan.sequence().iter().enumerate() {
        rows.push(SlotRow {
            index,
            kind: *kind,
            label: plan.label_of(index)?,
            duration_secs: plan.duration_of(index)?,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("preset: {}", validated.preset);
    for row in &rows {
        println!(
            "{:>2}  {:<10}  {}",
            row.index + 1,
            row.label,
            format_clock(row.duration_secs)
        );
    }
    println!(
        "total: {}  ({} work sessions)",
        format_clock(plan.total_secs()),
        plan.work_count()
    );
    Ok(())
}
