use anyhow::{bail, Context, Result};
use campaign_spend::aggregation::{group_mean_top_n, group_sum_all, group_sum_top_n};
use campaign_spend::logging::{init_logging, init_logging_json};
use campaign_spend::records::columns;
use campaign_spend::{BigQueryClient, Config, Datasets, LogFormat, Table};
use std::env;
use std::sync::Arc;

const USAGE: &str = "usage: campaign-spend <command>

commands:
  cities [n]       top municipalities by expenditure (default 15)
  all-cities       every municipality by expenditure
  cities-mean [n]  top municipalities by average expense (default 15)
  parties [n]      top parties by expenditure (default 10)
  map              expenditure per municipality id
  turnout          expenditure vs turnout per municipality
  status           load both datasets and report readiness";

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        println!("{}", USAGE);
        return Ok(());
    };
    if command == "help" || command == "--help" || command == "-h" {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::from_env().context("Invalid configuration")?;
    match config.log_format {
        LogFormat::Json => init_logging_json("campaign-spend", "warn"),
        LogFormat::Text => init_logging("campaign-spend", "warn"),
    }

    let warehouse = BigQueryClient::new(config.billing_project.clone(), config.credentials_path.clone())
        .with_api_base(config.bigquery_api_base.clone());
    let datasets = Datasets::new(Arc::new(warehouse));

    match command {
        "cities" => {
            let n = count_arg(&args, 15)?;
            let table = expenditures(&datasets).await?;
            print_json(&group_sum_top_n(&table, columns::MUNICIPALITY_NAME, columns::EXPENDITURE, n)?)?;
        }
        "all-cities" => {
            let table = expenditures(&datasets).await?;
            print_json(&group_sum_all(&table, columns::MUNICIPALITY_NAME, columns::EXPENDITURE)?)?;
        }
        "cities-mean" => {
            let n = count_arg(&args, 15)?;
            let table = expenditures(&datasets).await?;
            print_json(&group_mean_top_n(&table, columns::MUNICIPALITY_NAME, columns::EXPENDITURE, n)?)?;
        }
        "parties" => {
            let n = count_arg(&args, 10)?;
            let table = expenditures(&datasets).await?;
            print_json(&group_sum_top_n(&table, columns::PARTY_CODE, columns::EXPENDITURE, n)?)?;
        }
        "map" => {
            let table = expenditures(&datasets).await?;
            print_json(&group_sum_all(&table, columns::MUNICIPALITY_ID, columns::EXPENDITURE)?)?;
        }
        "turnout" => {
            let Some(table) = datasets.crossed().await else {
                bail!("crossed dataset unavailable (see log for the cause)");
            };
            print_json(&table)?;
        }
        "status" => {
            let readiness = datasets.warm_up().await;
            println!("{}", serde_json::to_string_pretty(&readiness)?);
            if !readiness.ready {
                std::process::exit(1);
            }
        }
        other => {
            eprintln!("unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

async fn expenditures(datasets: &Datasets) -> Result<Arc<Table>> {
    match datasets.expenditures().await {
        Some(table) => Ok(table),
        None => bail!("expenditure dataset unavailable (see log for the cause)"),
    }
}

fn count_arg(args: &[String], default: usize) -> Result<usize> {
    match args.get(1) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("expected a number, got {:?}", raw)),
        None => Ok(default),
    }
}

fn print_json(table: &Table) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&table.records())?);
    Ok(())
}
