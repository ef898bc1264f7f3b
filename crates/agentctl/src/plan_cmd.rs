use anyhow::Result;
use engine_planner::Planner;

use crate::cli::{OutputFormat, PlanCommands};

pub async fn run(planner: &Planner, cmd: PlanCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        PlanCommands::Create { description } => {
            let plan_id = planner.create_plan(&description)?;
            println!("{plan_id}");
        }
        PlanCommands::Run { plan_id } => {
            planner.execute(&plan_id).await?;
            let plan = planner.get_plan(&plan_id)?;
            println!("{} -> {}", plan.id, plan.status);
        }
        PlanCommands::Pause { plan_id } => planner.pause(&plan_id)?,
        PlanCommands::Resume { plan_id } => {
            planner.resume(&plan_id)?;
            planner.execute(&plan_id).await?;
        }
        PlanCommands::Cancel { plan_id } => planner.cancel(&plan_id)?,
        PlanCommands::Rollback {
            plan_id,
            checkpoint_id,
        } => planner.rollback_to_checkpoint(&plan_id, &checkpoint_id)?,
        PlanCommands::Show { plan_id } => {
            let plan = planner.get_plan(&plan_id)?;
            print_plan(&plan, format);
        }
        PlanCommands::Logs { plan_id } => {
            for line in planner.get_logs(&plan_id)? {
                println!("{line}");
            }
        }
        PlanCommands::Preview { plan_id } => {
            let previews = planner.preview(&plan_id)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&previews)?),
                OutputFormat::Text => {
                    for p in previews {
                        println!("{}", p.output);
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_plan(plan: &engine_core::Plan, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(plan) {
                println!("{json}");
            }
        }
        OutputFormat::Text => {
            println!("{} [{}] {}", plan.id, plan.status, plan.description);
            for step in &plan.steps {
                println!("  {} [{}] {}", step.id, step.status, step.tool);
            }
        }
    }
}
