use mongodb::{
    options::{ClientOptions, ServerApi, ServerApiVersion},
    Client, Database,
};
use std::time::Duration;

use crate::error::PlannerError;

/// Connects to `uri` and returns the `database` handle. A failed ping is
/// only logged: the planner falls back to its local cache while the store
/// is unreachable.
pub async fn connect(uri: &str, database: &str) -> Result<Database, PlannerError> {
    log::info!("Connecting to MongoDB database {}", database);

    let mut client_options = ClientOptions::parse(uri)
        .await
        .map_err(|e| PlannerError::Config(format!("invalid MONGODB_URI: {}", e)))?;

    client_options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
    client_options.connect_timeout = Some(Duration::from_secs(10));
    client_options.server_selection_timeout = Some(Duration::from_secs(10));
    client_options.max_pool_size = Some(10);
    client_options.min_pool_size = Some(1);

    let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
    client_options.server_api = Some(server_api);

    let client = Client::with_options(client_options)
        .map_err(|e| PlannerError::Config(format!("failed to create MongoDB client: {}", e)))?;
    let database = client.database(database);

    match database.run_command(mongodb::bson::doc! {"ping": 1}).await {
        Ok(_) => log::info!("Connected to MongoDB and verified with ping"),
        Err(e) => log::warn!("MongoDB ping failed, running in degraded mode: {}", e),
    }

    Ok(database)
}
