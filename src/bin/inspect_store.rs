use pool_indexer::api::{ApiResponse, QueryService};
use pool_indexer::config::Config;
use pool_indexer::db::connection;
use pool_indexer::{EntityKind, QueryParams, SortDirection};

// Usage: inspect_store <chain> [limit]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let chain_name = args.next().ok_or("usage: inspect_store <chain> [limit]")?;
    let limit: i64 = match args.next() {
        Some(value) => value.parse()?,
        None => 5,
    };

    let config = Config::from_env()?;
    let chain = config
        .chain(&chain_name)
        .ok_or_else(|| format!("chain {chain_name} is not configured"))?;

    println!("Opening store {}...", chain.database_url);
    let pool = connection::establish_connection(&chain.database_url, 1).await?;

    let mut service = QueryService::new();
    service.add_chain(chain.name.clone(), pool, chain.start_block);

    println!("Last block: {}", service.last_block(&chain.name).await?);
    let mut counts = serde_json::Map::new();
    for kind in EntityKind::ALL {
        counts.insert(kind.to_string(), service.count(&chain.name, kind).await?.into());
    }
    println!("Records:\n{}", ApiResponse::new(counts).to_json()?);

    // Most recent records per kind, newest first
    let latest = |kind: EntityKind| {
        QueryParams::new()
            .order_by(kind.ordering_field(), SortDirection::Desc)
            .limit(limit)
    };
    let (reader, name) = (&service, chain.name.as_str());
    let total = move |kind: EntityKind| reader.count(name, kind);

    let deposits = service.deposits(&chain.name, &latest(EntityKind::Deposits)).await?;
    let response = ApiResponse::with_total_count(deposits, total(EntityKind::Deposits).await?);
    println!("Deposits:\n{}", response.to_json()?);

    let withdrawals = service
        .withdrawals(&chain.name, &latest(EntityKind::Withdrawals))
        .await?;
    let response = ApiResponse::with_total_count(withdrawals, total(EntityKind::Withdrawals).await?);
    println!("Withdrawals:\n{}", response.to_json()?);

    let notes = service
        .encrypted_notes(&chain.name, &latest(EntityKind::EncryptedNotes))
        .await?;
    let response = ApiResponse::with_total_count(notes, total(EntityKind::EncryptedNotes).await?);
    println!("Encrypted notes:\n{}", response.to_json()?);

    let relayers = service.relayers(&chain.name, &latest(EntityKind::Relayers)).await?;
    let response = ApiResponse::with_total_count(relayers, total(EntityKind::Relayers).await?);
    println!("Relayers:\n{}", response.to_json()?);

    let accounts = service
        .note_accounts(&chain.name, &latest(EntityKind::NoteAccounts))
        .await?;
    let response = ApiResponse::with_total_count(accounts, total(EntityKind::NoteAccounts).await?);
    println!("Note accounts:\n{}", response.to_json()?);

    let delegations = service
        .delegations(&chain.name, &latest(EntityKind::Delegations))
        .await?;
    let response = ApiResponse::with_total_count(delegations, total(EntityKind::Delegations).await?);
    println!("Delegations:\n{}", response.to_json()?);

    Ok(())
}
