//! `lix account`: the stored identity commits fall back to.

use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand};
use lix_core::account::Account;
use serde::Serialize;

use super::open_lix;
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct AccountArgs {
    #[command(subcommand)]
    pub command: AccountCommand,
}

#[derive(Subcommand, Debug)]
pub enum AccountCommand {
    /// List stored accounts; the active one is marked with `*`.
    List,

    /// Store an account and make it active.
    Set { name: String },
}

#[derive(Debug, Serialize)]
struct AccountRow {
    #[serde(flatten)]
    account: Account,
    active: bool,
}

/// Execute `lix account <command>`.
///
/// # Errors
///
/// Returns an error if the lix cannot be opened or the name is blank.
pub fn run_account(args: &AccountArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let mut lix = open_lix(project_root, None)?;
    match &args.command {
        AccountCommand::List => {
            let active = lix.history().active_account()?;
            let rows: Vec<AccountRow> = lix
                .history()
                .accounts()?
                .into_iter()
                .map(|account| AccountRow {
                    active: account.id == active.id,
                    account,
                })
                .collect();
            render(output, &rows, |rows, w| {
                for r in rows {
                    let marker = if r.active { "*" } else { " " };
                    writeln!(w, "{marker} {}", r.account.name)?;
                }
                Ok(())
            })
        }
        AccountCommand::Set { name } => {
            let account = Account::new(name.trim());
            lix.history_mut().set_active_account(&account)?;
            render(output, &account, |a, w| writeln!(w, "✓ Active account is {}", a.name))
        }
    }
}
