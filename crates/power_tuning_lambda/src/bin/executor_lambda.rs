use lambda_runtime::Error;
use power_tuning_lambda::runtime::{run, Phase};

#[tokio::main]
async fn main() -> Result<(), Error> {
    run(Phase::Executor).await
}
