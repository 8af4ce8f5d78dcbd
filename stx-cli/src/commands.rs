//! An interface that passes strings (e.g. from a cli, into stxlib)

mod error;
mod utils;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;

use indoc::indoc;
use json::object;
use tokio::runtime::Runtime;

use stxlib::api;
use stxlib::client::StxClient;
use stxlib::stx_sync::ledger::{CollectionKey, ConfirmedTx, ResourceKind, TxRecord};
use stxlib::submit::SubmissionRequest;
use stxlib::utils::now_ms;

/// Runtime the commands block on.
pub static RT: LazyLock<Runtime> = LazyLock::new(|| match Runtime::new() {
    Ok(runtime) => runtime,
    Err(e) => panic!("Could not start the tokio runtime. {e}"),
});

/// This command interface is used both by cli and also consumers.
pub trait Command {
    /// display command help (in cli)
    fn help(&self) -> &'static str;

    /// One line summary shown by `help`.
    fn short_help(&self) -> &'static str;

    /// in stx-cli, this string is printed to console
    /// consumers expect it to be a json object unless the arguments were invalid
    fn exec(&self, args: &[&str], client: &StxClient) -> String;
}

/// Commands that run before a client exists.
pub trait ShortCircuitedCommand {
    /// Runs the command without a client.
    fn exec_without_client(args: Vec<String>) -> String;
}

fn invalid_arguments(command: &str) -> String {
    format!("Error: invalid arguments\nTry 'help {command}' for correct usage and examples")
}

struct ChangeServerCommand {}
impl Command for ChangeServerCommand {
    fn help(&self) -> &'static str {
        indoc! {r"
            Change the ledger API server to receive blockchain data from

            Usage:
            change_server [server_uri]

            Example:
            change_server http://localhost:3999
        "}
    }

    fn short_help(&self) -> &'static str {
        "Change ledger API server"
    }

    fn exec(&self, args: &[&str], client: &StxClient) -> String {
        match args.len() {
            1 => match http::Uri::from_str(args[0]) {
                Ok(uri) if uri.scheme().is_some() && uri.host().is_some() => {
                    client.set_server(uri);
                    "server set"
                }
                _ => "invalid server uri",
            }
            .to_string(),
            _ => self.help().to_string(),
        }
    }
}

/// Lists the commands.
pub struct HelpCommand {}
impl HelpCommand {
    fn respond(args: &[&str]) -> Option<String> {
        let mut responses = vec![];

        match args.len() {
            0 => {
                responses.push("Available commands:".to_string());
                for (cmd, obj) in &get_commands() {
                    responses.push(format!("{} - {}", cmd, obj.short_help()));
                }

                responses.sort();
                Some(responses.join("\n"))
            }
            1 => Some(match get_commands().get(args[0]) {
                Some(cmd) => cmd.help().to_string(),
                None => format!("Command {} not found", args[0]),
            }),
            _ => None,
        }
    }
}

impl Command for HelpCommand {
    fn help(&self) -> &'static str {
        indoc! {r#"
            List all available commands
            Usage:
            help [command_name]

            If no "command_name" is specified, a list of all available commands is returned
            Example:
            help timeline

        "#}
    }

    fn short_help(&self) -> &'static str {
        "Lists all available commands"
    }

    fn exec(&self, args: &[&str], _: &StxClient) -> String {
        Self::respond(args).unwrap_or_else(|| self.help().to_string())
    }
}

impl ShortCircuitedCommand for HelpCommand {
    fn exec_without_client(args: Vec<String>) -> String {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        Self::respond(&args).unwrap_or_else(|| HelpCommand {}.help().to_string())
    }
}

struct StatusCommand {}
impl Command for StatusCommand {
    fn help(&self) -> &'static str {
        indoc! {r"
            Get the status of the ledger API we're connected to
            Usage:
            status

        "}
    }

    fn short_help(&self) -> &'static str {
        "Get the ledger API server's status"
    }

    fn exec(&self, _args: &[&str], client: &StxClient) -> String {
        RT.block_on(async move {
            match api::get_status(client.transport().as_ref()).await {
                Ok(status) => object! {
                    "server" => client.server_uri().to_string(),
                    "network" => client.config().network.to_string(),
                    "status" => status.status.clone(),
                    "ready" => status.is_ready(),
                    "server_version" => status.server_version,
                }
                .pretty(2),
                Err(e) => json::JsonValue::from(e).pretty(2),
            }
        })
    }
}

struct AccountCommand {}
impl Command for AccountCommand {
    fn help(&self) -> &'static str {
        indoc! {r"
            Fetches the confirmed balance and nonce of an account and shows its ledger state,
            including the local nonce used for the next submission.

            Usage:
            account <principal>

            Example:
            account ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM
        "}
    }

    fn short_help(&self) -> &'static str {
        "Fetch and show the ledger state of an account"
    }

    fn exec(&self, args: &[&str], client: &StxClient) -> String {
        if args.len() != 1 {
            return invalid_arguments("account");
        }
        let principal = args[0];
        RT.block_on(async move {
            if let Err(e) = client.fetch_account(principal).await {
                log::warn!("Account fetch of {principal} failed. {e}");
            }
            match client.account(principal).await {
                Some(account) => json::JsonValue::from(account).pretty(2),
                None => object! { "error" => "unknown account" }.pretty(2),
            }
        })
    }
}

struct BalancesCommand {}
impl Command for BalancesCommand {
    fn help(&self) -> &'static str {
        indoc! {r"
            Shows the STX and token balances of an address.

            Usage:
            balances <principal>
        "}
    }

    fn short_help(&self) -> &'static str {
        "Show the balances of an address"
    }

    fn exec(&self, args: &[&str], client: &StxClient) -> String {
        if args.len() != 1 {
            return invalid_arguments("balances");
        }
        RT.block_on(async move {
            match api::get_balances(client.transport().as_ref(), args[0]).await {
                Ok(balances) => json::JsonValue::from(balances).pretty(2),
                Err(e) => json::JsonValue::from(e).pretty(2),
            }
        })
    }
}

struct NonceCommand {}
impl Command for NonceCommand {
    fn help(&self) -> &'static str {
        indoc! {r"
            Shows the confirmed and local nonce of an account without fetching it.

            Usage:
            nonce <principal>
        "}
    }

    fn short_help(&self) -> &'static str {
        "Show the nonces of an account"
    }

    fn exec(&self, args: &[&str], client: &StxClient) -> String {
        if args.len() != 1 {
            return invalid_arguments("nonce");
        }
        RT.block_on(async move {
            match client.account(args[0]).await {
                Some(account) => object! {
                    "principal" => account.principal(),
                    "confirmed_nonce" => account.confirmed_nonce(),
                    "local_nonce" => account.local_nonce(),
                }
                .pretty(2),
                None => object! { "error" => "unknown account, run 'account' first" }.pretty(2),
            }
        })
    }
}

struct ResetNonceCommand {}
impl Command for ResetNonceCommand {
    fn help(&self) -> &'static str {
        indoc! {r"
            Discards the optimistic local nonce of an account, resetting it to the last confirmed nonce.

            Usage:
            reset_nonce <principal>
        "}
    }

    fn short_help(&self) -> &'static str {
        "Reset the local nonce to the confirmed nonce"
    }

    fn exec(&self, args: &[&str], client: &StxClient) -> String {
        if args.len() != 1 {
            return invalid_arguments("reset_nonce");
        }
        RT.block_on(async move {
            let local_nonce = client.reset_local_nonce(args[0]).await;
            object! { "principal" => args[0], "local_nonce" => local_nonce }.pretty(2)
        })
    }
}

struct ClearErrorCommand {}
impl Command for ClearErrorCommand {
    fn help(&self) -> &'static str {
        indoc! {r"
            Clears the last error recorded for an account.

            Usage:
            clear_error <principal>
        "}
    }

    fn short_help(&self) -> &'static str {
        "Clear the last error of an account"
    }

    fn exec(&self, args: &[&str], client: &StxClient) -> String {
        if args.len() != 1 {
            return invalid_arguments("clear_error");
        }
        RT.block_on(async move {
            client.clear_error(args[0]).await;
            object! { "result" => "success" }.pretty(2)
        })
    }
}

struct TransactionsCommand {}
impl Command for TransactionsCommand {
    fn help(&self) -> &'static str {
        indoc! {r"
            Lists the confirmed transactions of an address, newest first.

            Usage:
            transactions <principal> [limit]

            Example:
            transactions ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM 10
        "}
    }

    fn short_help(&self) -> &'static str {
        "List the confirmed transactions of an address"
    }

    fn exec(&self, args: &[&str], client: &StxClient) -> String {
        let limit = match args {
            [_] => client.config().sync_config.account_tx_limit,
            [_, limit] => match limit.parse::<u64>() {
                Ok(limit) => limit,
                Err(e) => return format!("Error: {}", error::CommandError::from(e)),
            },
            _ => return invalid_arguments("transactions"),
        };
        RT.block_on(async move {
            match api::get_address_transactions(client.transport().as_ref(), args[0], limit).await
            {
                Ok(transactions) => json::JsonValue::from(
                    transactions
                        .into_iter()
                        .map(|tx| utils::tx_record_json(&TxRecord::Confirmed(tx)))
                        .collect::<Vec<_>>(),
                )
                .pretty(2),
                Err(e) => json::JsonValue::from(e).pretty(2),
            }
        })
    }
}

struct MempoolCommand {}
impl Command for MempoolCommand {
    fn help(&self) -> &'static str {
        indoc! {r"
            Lists mempool transactions, optionally only those of one address.

            Usage:
            mempool [principal]
        "}
    }

    fn short_help(&self) -> &'static str {
        "List mempool transactions"
    }

    fn exec(&self, args: &[&str], client: &StxClient) -> String {
        if args.len() > 1 {
            return invalid_arguments("mempool");
        }
        let limit = client.config().sync_config.page_limit;
        RT.block_on(async move {
            match api::get_mempool(client.transport().as_ref(), args.first().copied(), limit).await
            {
                Ok(mempool) => json::JsonValue::from(
                    mempool
                        .into_iter()
                        .map(|tx| utils::tx_record_json(&TxRecord::Mempool(tx)))
                        .collect::<Vec<_>>(),
                )
                .pretty(2),
                Err(e) => json::JsonValue::from(e).pretty(2),
            }
        })
    }
}

struct TimelineCommand {}
impl Command for TimelineCommand {
    fn help(&self) -> &'static str {
        indoc! {r"
            Shows pending and confirmed transactions as one timeline. Pending transactions come first.
            Mempool entries older than the pending window are dropped, and confirmed entries replace
            pending entries with the same id.

            Usage:
            timeline [principal] [view=<pending|microblock|anchor_block>] [limit=<n>] [hide_failed] [hide_pending] [types=<type>,...]

            Example:
            timeline ST1PQHQKV0RJXZFY1DGX8MNSNYVE3VGZJSRTPGZGM limit=10 types=token_transfer,contract_call
        "}
    }

    fn short_help(&self) -> &'static str {
        "Show the reconciled transaction timeline"
    }

    fn exec(&self, args: &[&str], client: &StxClient) -> String {
        let (principal, options) = match utils::parse_timeline_args(args, now_ms()) {
            Ok(parsed) => parsed,
            Err(e) => {
                return format!(
                    "Error: {e}\nTry 'help timeline' for correct usage and examples"
                );
            }
        };
        RT.block_on(async move {
            match client.timeline(principal.as_deref(), options).await {
                Ok(timeline) => utils::timeline_json(&timeline).pretty(2),
                Err(e) => json::JsonValue::from(e).pretty(2),
            }
        })
    }
}

struct RecentCommand {}
impl Command for RecentCommand {
    fn help(&self) -> &'static str {
        indoc! {r"
            Shows the first page of recent confirmed transactions, loading one more page per extra count.

            Usage:
            recent [pages]
        "}
    }

    fn short_help(&self) -> &'static str {
        "Page through recent confirmed transactions"
    }

    fn exec(&self, args: &[&str], client: &StxClient) -> String {
        let pages = match args {
            [] => 1,
            [pages] => match pages.parse::<usize>() {
                Ok(pages) => pages.max(1),
                Err(e) => return format!("Error: {}", error::CommandError::from(e)),
            },
            _ => return invalid_arguments("recent"),
        };
        RT.block_on(async move {
            let collection =
                client.subscribe::<ConfirmedTx>(CollectionKey::new(ResourceKind::Transaction));
            collection.settled().await;
            while collection.page_count() < pages && !collection.is_reaching_end() {
                collection.load_more().await;
                if collection.last_error().is_some() {
                    break;
                }
            }
            let result = object! {
                "pages" => collection.page_count(),
                "reaching_end" => collection.is_reaching_end(),
                "error" => collection.last_error().map(|e| e.to_string()),
                "transactions" => collection
                    .items()
                    .into_iter()
                    .map(|tx| utils::tx_record_json(&TxRecord::Confirmed(tx)))
                    .collect::<Vec<_>>(),
            };
            collection.unsubscribe();
            result.pretty(2)
        })
    }
}

struct BlocksCommand {}
impl Command for BlocksCommand {
    fn help(&self) -> &'static str {
        indoc! {r"
            Shows recent anchor blocks, each followed by the microblocks it confirmed.

            Usage:
            blocks [limit]
        "}
    }

    fn short_help(&self) -> &'static str {
        "Show recent blocks and microblocks"
    }

    fn exec(&self, args: &[&str], client: &StxClient) -> String {
        let limit = match args {
            [] => None,
            [limit] => match limit.parse::<usize>() {
                Ok(limit) => Some(limit),
                Err(e) => return format!("Error: {}", error::CommandError::from(e)),
            },
            _ => return invalid_arguments("blocks"),
        };
        RT.block_on(async move {
            match client.block_feed(limit).await {
                Ok(feed) => json::JsonValue::from(
                    feed.iter().map(utils::block_feed_json).collect::<Vec<_>>(),
                )
                .pretty(2),
                Err(e) => json::JsonValue::from(e).pretty(2),
            }
        })
    }
}

struct FaucetCommand {}
impl Command for FaucetCommand {
    fn help(&self) -> &'static str {
        indoc! {r"
            Requests test STX for an address. Only available on testnet and mocknet.

            Usage:
            faucet <principal>
        "}
    }

    fn short_help(&self) -> &'static str {
        "Request test STX from the faucet"
    }

    fn exec(&self, args: &[&str], client: &StxClient) -> String {
        if args.len() != 1 {
            return invalid_arguments("faucet");
        }
        RT.block_on(async move {
            match client.request_faucet_funds(args[0]).await {
                Ok(faucet) => object! {
                    "success" => faucet.success,
                    "txid" => faucet.tx_id,
                }
                .pretty(2),
                Err(e) => json::JsonValue::from(e).pretty(2),
            }
        })
    }
}

struct BroadcastRawCommand {}
impl Command for BroadcastRawCommand {
    fn help(&self) -> &'static str {
        indoc! {r"
            Broadcasts a signed, hex encoded transaction on behalf of an account.
            The account's local nonce advances once the node accepts the transaction.

            Usage:
            broadcast_raw <principal> <transaction hex>
        "}
    }

    fn short_help(&self) -> &'static str {
        "Broadcast a signed transaction"
    }

    fn exec(&self, args: &[&str], client: &StxClient) -> String {
        if args.len() != 2 {
            return invalid_arguments("broadcast_raw");
        }
        RT.block_on(async move {
            match client.submit(SubmissionRequest::raw(args[0], args[1])).await {
                Ok(tx_id) => object! { "txid" => tx_id }.pretty(2),
                Err(e) => json::JsonValue::from(e).pretty(2),
            }
        })
    }
}

struct SubmissionProgressCommand {}
impl Command for SubmissionProgressCommand {
    fn help(&self) -> &'static str {
        indoc! {r"
            Get the progress of the latest transaction submission

            Usage:
            submission_progress
        "}
    }

    fn short_help(&self) -> &'static str {
        "Get the progress of the latest submission"
    }

    fn exec(&self, _args: &[&str], client: &StxClient) -> String {
        RT.block_on(
            async move { json::JsonValue::from(client.submission_progress().await).pretty(2) },
        )
    }
}

struct SaveCommand {}
impl Command for SaveCommand {
    fn help(&self) -> &'static str {
        indoc! {r"
            Saves the account states to disk.

            Usage:
            save
        "}
    }

    fn short_help(&self) -> &'static str {
        "Save account states to disk"
    }

    fn exec(&self, _args: &[&str], client: &StxClient) -> String {
        RT.block_on(async move {
            match client.save_accounts().await {
                Ok(()) => object! { "result" => "success" }.pretty(2),
                Err(e) => object! { "result" => "error", "error" => e.to_string() }.pretty(2),
            }
        })
    }
}

struct QuitCommand {}
impl Command for QuitCommand {
    fn help(&self) -> &'static str {
        indoc! {r"
            Quit the client, saving account states to disk

            Usage:
            quit
        "}
    }

    fn short_help(&self) -> &'static str {
        "Quit the client, saving account states to disk"
    }

    fn exec(&self, _args: &[&str], client: &StxClient) -> String {
        let save = do_user_command("save", &[], client);
        format!("{save}\nStx CLI quit successfully.")
    }
}

/// Returns every command by name.
pub fn get_commands() -> HashMap<&'static str, Box<dyn Command>> {
    let entries: Vec<(&'static str, Box<dyn Command>)> = vec![
        ("help", Box::new(HelpCommand {})),
        ("status", Box::new(StatusCommand {})),
        ("change_server", Box::new(ChangeServerCommand {})),
        ("account", Box::new(AccountCommand {})),
        ("balances", Box::new(BalancesCommand {})),
        ("nonce", Box::new(NonceCommand {})),
        ("reset_nonce", Box::new(ResetNonceCommand {})),
        ("clear_error", Box::new(ClearErrorCommand {})),
        ("transactions", Box::new(TransactionsCommand {})),
        ("mempool", Box::new(MempoolCommand {})),
        ("timeline", Box::new(TimelineCommand {})),
        ("recent", Box::new(RecentCommand {})),
        ("blocks", Box::new(BlocksCommand {})),
        ("faucet", Box::new(FaucetCommand {})),
        ("broadcast_raw", Box::new(BroadcastRawCommand {})),
        ("submission_progress", Box::new(SubmissionProgressCommand {})),
        ("save", Box::new(SaveCommand {})),
        ("quit", Box::new(QuitCommand {})),
    ];

    entries.into_iter().collect()
}

/// Runs `cmd` with `args` against `client`.
pub fn do_user_command(cmd: &str, args: &[&str], client: &StxClient) -> String {
    match get_commands().get(cmd.to_ascii_lowercase().as_str()) {
        Some(cmd) => cmd.exec(args, client),
        None => format!("Unknown command : {cmd}. Type 'help' for a list of commands"),
    }
}
