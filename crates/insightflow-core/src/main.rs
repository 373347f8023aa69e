use anyhow::Result;
use clap::{value_parser, Arg, ArgAction, Command};
use insightflow_cache::{MokaQueryResultCache, MokaSchemaCache};
use insightflow_core::harness::{ScriptedModel, StaticDataAccess};
use insightflow_core::{CoordinatorConfig, RetryConfig, WorkflowCoordinator};
use insightflow_model::{DataSourceId, ExecutionStrategy, WorkflowRequest};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Command::new("insightflow")
        .version(insightflow_core::VERSION)
        .about("Query-to-insight orchestration demo (scripted capabilities)")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("ask")
                .about("Run one question through the pipeline")
                .arg(Arg::new("question").required(true).help("Natural-language question"))
                .arg(
                    Arg::new("conversational")
                        .long("conversational")
                        .action(ArgAction::SetTrue)
                        .help("Run without a data source (narration only)"),
                )
                .arg(
                    Arg::new("combined")
                        .long("combined")
                        .action(ArgAction::SetTrue)
                        .help("Use one combined artifact-generation call"),
                )
                .arg(
                    Arg::new("retries")
                        .long("retries")
                        .default_value("3")
                        .value_parser(value_parser!(u32))
                        .help("Retry cap per stage"),
                ),
        );

    match cli.get_matches().subcommand() {
        Some(("ask", args)) => {
            let question = args.get_one::<String>("question").expect("required");
            let conversational = args.get_flag("conversational");
            let combined = args.get_flag("combined");
            let retries = *args.get_one::<u32>("retries").expect("defaulted");

            let data_source = DataSourceId::new("demo-warehouse");
            let data = Arc::new(StaticDataAccess::with_sales_fixture(&data_source));
            let model = Arc::new(ScriptedModel::new());

            let coordinator = WorkflowCoordinator::new(
                data,
                model,
                Arc::new(MokaSchemaCache::default()),
                Arc::new(MokaQueryResultCache::default()),
            )
            .with_config(
                CoordinatorConfig::default()
                    .with_retry(
                        RetryConfig::default()
                            .with_max_stage_retries(retries)
                            .with_base_delay(Duration::from_millis(50)),
                    ),
            );

            let (tx, mut rx) = tokio::sync::mpsc::channel(32);
            let coordinator = coordinator.with_progress(tx);
            let printer = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    println!(
                        "[{:>3}%] {} - {}",
                        event.percent_complete, event.stage, event.message
                    );
                }
            });

            let mut request = WorkflowRequest::new(question.clone());
            if !conversational {
                request = request.with_data_source(data_source);
            }
            if combined {
                request = request.with_strategy(ExecutionStrategy::combined());
            }

            let result = coordinator.run(request).await;
            drop(coordinator);
            let _ = printer.await;

            println!("{}", serde_json::to_string_pretty(&result)?);
            std::process::exit(i32::from(!result.success));
        }
        _ => unreachable!("subcommand required"),
    }
}
