//! Subscriptions command - List the subscriptions the logged-in account can use

use crate::az::AzInvoker;
use crate::models::Subscription;
use crate::provision::steps;
use crate::Result;

use super::format::render_table;

/// Render subscriptions in the order `deploy` numbers them.
pub fn render(subscriptions: &[Subscription]) -> String {
    let rows: Vec<Vec<String>> = subscriptions
        .iter()
        .enumerate()
        .map(|(i, s)| vec![i.to_string(), s.name.clone(), s.id.clone()])
        .collect();
    render_table(&["#", "NAME", "ID"], &rows)
}

/// Entry point for `azswarm subscriptions`.
pub async fn run(az: &dyn AzInvoker) -> Result<()> {
    let subscriptions = steps::list_subscriptions(az).await?;
    println!("{}", render(&subscriptions));
    Ok(())
}
