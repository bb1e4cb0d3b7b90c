use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rifa_db::db::run_migrations;
use rifa_db::models::order::OrderStatus;
use serde::Serialize;
use serde_json::Value;

use crate::services::order_service::Canceller;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "rifa-panel")]
#[command(about = "Raffle ledger administration CLI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply the document store migrations
    Migrate,
    /// Record that an order's payment was received
    OrderPaid {
        order_id: String,
        #[arg(long)]
        method: String,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long, env = "ADMIN_ID")]
        admin: String,
    },
    /// Issue the tickets of a paid order
    OrderVerify {
        order_id: String,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long, env = "ADMIN_ID")]
        admin: String,
    },
    /// Reject an order (a reason is mandatory)
    OrderReject {
        order_id: String,
        #[arg(long)]
        reason: String,
        #[arg(long, env = "ADMIN_ID")]
        admin: String,
    },
    /// Cancel a pending order
    OrderCancel {
        order_id: String,
        #[arg(long)]
        reason: Option<String>,
        #[arg(long, env = "ADMIN_ID")]
        admin: String,
    },
    /// Find orders whose code contains the fragment
    OrderSearch { fragment: String },
    /// List the orders of a buyer, or every order in a status
    Orders {
        #[arg(long, conflicts_with = "status", required_unless_present = "status")]
        user: Option<String>,
        #[arg(long, value_parser = parse_order_status)]
        status: Option<OrderStatus>,
    },
    /// Tickets currently held by a user, or every ticket of a raffle
    Tickets {
        #[arg(long, conflicts_with = "raffle", required_unless_present = "raffle")]
        user: Option<String>,
        #[arg(long)]
        raffle: Option<String>,
    },
    /// Commissions earned by a user
    Commissions {
        user_id: String,
        #[arg(long, conflicts_with = "level")]
        pending: bool,
        /// Upline level, 1 to 3
        #[arg(long)]
        level: Option<u8>,
    },
    /// Mark a commission as paid out
    CommissionPaid {
        commission_id: String,
        #[arg(long)]
        method: String,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long, env = "ADMIN_ID")]
        admin: String,
    },
    /// Return a paid commission to pending
    CommissionRevert {
        commission_id: String,
        #[arg(long)]
        reason: String,
        #[arg(long, env = "ADMIN_ID")]
        admin: String,
    },
    /// Hand over a won prize after checking its code
    RedeemPrize {
        prize_id: String,
        code: String,
        #[arg(long, env = "ADMIN_ID")]
        admin: String,
    },
    /// Roulette chances a user holds across raffles
    Chances { user_id: String },
    /// Prizes won by a user, or every prize won in a raffle
    Prizes {
        #[arg(long, conflicts_with = "raffle", required_unless_present = "raffle")]
        user: Option<String>,
        #[arg(long)]
        raffle: Option<String>,
    },
    /// Referral network of one user, or of every referrer when omitted
    NetworkStats { user_id: Option<String> },
    /// Top buyers of a raffle
    Leaderboard {
        raffle_id: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn parse_order_status(value: &str) -> std::result::Result<OrderStatus, String> {
    serde_json::from_value(Value::String(value.trim().to_uppercase()))
        .map_err(|_| format!("unknown order status `{}`", value))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", out);
    Ok(())
}

pub async fn run(state: &AppState, command: Commands) -> Result<()> {
    match command {
        Commands::Migrate => match &state.pool {
            Some(pool) => {
                run_migrations(pool).await?;
                println!("Migrations applied.");
            }
            None => println!("In-memory store selected, nothing to migrate."),
        },
        Commands::OrderPaid {
            order_id,
            method,
            notes,
            admin,
        } => {
            let order = state
                .order_service
                .mark_paid(&order_id, &method, notes.as_deref(), &admin)
                .await
                .context("Failed to mark order as paid")?;
            print_json(&order)?;
        }
        Commands::OrderVerify {
            order_id,
            notes,
            admin,
        } => {
            let verification = state
                .order_service
                .verify(&order_id, &admin, notes.as_deref())
                .await
                .context("Failed to verify order")?;
            print_json(&verification)?;
        }
        Commands::OrderReject {
            order_id,
            reason,
            admin,
        } => {
            let order = state
                .order_service
                .reject(&order_id, &reason, &admin)
                .await
                .context("Failed to reject order")?;
            print_json(&order)?;
        }
        Commands::OrderCancel {
            order_id,
            reason,
            admin,
        } => {
            let order = state
                .order_service
                .cancel(&order_id, reason.as_deref(), Canceller::Admin(&admin))
                .await
                .context("Failed to cancel order")?;
            print_json(&order)?;
        }
        Commands::OrderSearch { fragment } => {
            let orders = state.order_service.search_by_code(&fragment).await?;
            print_json(&orders)?;
        }
        Commands::Orders { user, status } => {
            let orders = match (user, status) {
                (Some(user), _) => state.order_service.list_for_user(&user).await?,
                (None, Some(status)) => state.order_service.list_by_status(status).await?,
                (None, None) => Vec::new(),
            };
            print_json(&orders)?;
        }
        Commands::Tickets { user, raffle } => {
            let tickets = match (user, raffle) {
                (Some(user), _) => state.ticket_service.get_tickets_for_user(&user).await?,
                (None, Some(raffle)) => state.ticket_service.get_raffle_tickets(&raffle).await?,
                (None, None) => Vec::new(),
            };
            print_json(&tickets)?;
        }
        Commands::Commissions {
            user_id,
            pending,
            level,
        } => {
            let service = &state.commission_service;
            let commissions = match level {
                Some(level) => service.get_for_user_at_level(&user_id, level).await?,
                None if pending => service.get_pending_for_user(&user_id).await?,
                None => service.get_for_user(&user_id).await?,
            };
            print_json(&commissions)?;
        }
        Commands::CommissionPaid {
            commission_id,
            method,
            notes,
            admin,
        } => {
            let commission = state
                .commission_service
                .mark_paid(&commission_id, &method, notes.as_deref(), &admin)
                .await
                .context("Failed to mark commission as paid")?;
            print_json(&commission)?;
        }
        Commands::CommissionRevert {
            commission_id,
            reason,
            admin,
        } => {
            let commission = state
                .commission_service
                .revert_payment(&commission_id, &reason, &admin)
                .await
                .context("Failed to revert commission payment")?;
            print_json(&commission)?;
        }
        Commands::RedeemPrize {
            prize_id,
            code,
            admin,
        } => {
            let prize = state
                .prize_service
                .redeem(&prize_id, &code, &admin)
                .await
                .context("Failed to redeem prize")?;
            print_json(&prize)?;
        }
        Commands::Chances { user_id } => {
            print_json(&state.roulette_service.get_chances_for_user(&user_id).await?)?;
        }
        Commands::Prizes { user, raffle } => {
            let prizes = match (user, raffle) {
                (Some(user), _) => state.prize_service.get_prizes_for_user(&user).await?,
                (None, Some(raffle)) => state.prize_service.get_prizes_for_raffle(&raffle).await?,
                (None, None) => Vec::new(),
            };
            print_json(&prizes)?;
        }
        Commands::NetworkStats { user_id } => match user_id {
            Some(user_id) => print_json(&state.network_service.get_network_stats(&user_id).await?)?,
            None => print_json(&state.network_service.get_admin_overview().await?)?,
        },
        Commands::Leaderboard { raffle_id, limit } => {
            let board = state.referral_service.get_leaderboard(&raffle_id, limit).await?;
            print_json(&board)?;
        }
    }
    Ok(())
}
