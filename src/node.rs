//! Bootstrapping and launching a local node console.
//!
//! The node binary is an external collaborator: we build its command line,
//! make sure the data directory holds an account, and spawn the console in
//! a new terminal window. Nothing is supervised after the spawn.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::process;

static ACCOUNT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Account #0: \{([0-9a-fA-F]+)\} keystore://(.*)").expect("account pattern is valid")
});

const HTTP_APIS: &str = "web3,eth,debug,personal,net";
const CORS_DOMAIN: &str = "https://remix.ethereum.org";
const MINER_SCRIPT: &str = "javascript/mineWhenNeeded.js";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Local,
    Mainnet,
    Ropsten,
}

impl Network {
    pub fn is_local(self) -> bool {
        self == Network::Local
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Local => write!(f, "local"),
            Network::Mainnet => write!(f, "mainnet"),
            Network::Ropsten => write!(f, "ropsten"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub address: String,
    pub keystore: PathBuf,
}

/// Extract account #0 from `account list` output.
pub fn parse_account_list(output: &str) -> Option<Account> {
    let caps = ACCOUNT_LINE.captures(output)?;
    Some(Account {
        address: caps[1].to_string(),
        keystore: PathBuf::from(caps[2].trim()),
    })
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    pub binary: PathBuf,
    pub network: Network,
    pub port: u16,
    /// Defaults to `~/Desktop/<network>-geth-<port>-node`.
    pub datadir: Option<PathBuf>,
    pub console_title: String,
    /// Terminal emulator prefix; the node command is appended after it.
    pub terminal: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("./build/bin/geth"),
            network: Network::Local,
            port: 8545,
            datadir: None,
            console_title: "Custom Geth Console".to_string(),
            terminal: ["gnome-terminal", "-t"].map(String::from).to_vec(),
        }
    }
}

impl NodeConfig {
    pub fn datadir(&self) -> PathBuf {
        self.datadir.clone().unwrap_or_else(|| {
            dirs::desktop_dir()
                .or_else(|| dirs::home_dir().map(|home| home.join("Desktop")))
                .unwrap_or_else(|| PathBuf::from("."))
                .join(format!("{}-geth-{}-node", self.network, self.port))
        })
    }

    pub fn password_path(&self) -> PathBuf {
        self.datadir().join("pass.txt")
    }

    /// Flags shared by every node invocation.
    pub fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "--http".to_string(),
            "--http.port".to_string(),
            self.port.to_string(),
            "--http.api".to_string(),
            HTTP_APIS.to_string(),
            format!("--http.corsdomain={CORS_DOMAIN}"),
        ];
        match self.network {
            Network::Mainnet => args.extend(["--syncmode", "full", "--mainnet"].map(String::from)),
            Network::Ropsten => args.extend(["--syncmode", "light", "--ropsten"].map(String::from)),
            Network::Local => {
                args.push("--datadir".to_string());
                args.push(self.datadir().display().to_string());
            }
        }
        args
    }

    /// Arguments that open the interactive console.
    pub fn console_args(&self, account: Option<&Account>) -> Vec<String> {
        let mut args = self.base_args();
        args.push("--vmdebug".to_string());
        if self.network.is_local()
            && let Some(account) = account
        {
            args.extend([
                "--allow-insecure-unlock".to_string(),
                "--unlock".to_string(),
                account.address.clone(),
                format!("--password={}", self.password_path().display()),
                "--preload".to_string(),
                MINER_SCRIPT.to_string(),
            ]);
        }
        args.push("console".to_string());
        args
    }

    /// Full argv for launching the console in a new terminal window.
    pub fn terminal_argv(&self, account: Option<&Account>) -> Vec<String> {
        let mut argv = self.terminal.clone();
        argv.push(self.console_title.clone());
        argv.push("--".to_string());
        argv.push(self.binary.display().to_string());
        argv.extend(self.console_args(account));
        argv
    }
}

/// Drives the node binary for one launch.
pub struct NodeLauncher {
    config: NodeConfig,
}

impl NodeLauncher {
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    fn datadir_arg(&self) -> String {
        format!("--datadir={}", self.config.datadir().display())
    }

    /// Account #0 of the data directory, if any.
    pub fn account(&self) -> Result<Option<Account>> {
        let output = process::output(&self.config.binary, [self.datadir_arg(), "account".into(), "list".into()])
            .map_err(|err| Error::io(err, format!("failed to run {}", self.config.binary.display())))?;
        Ok(parse_account_list(&output))
    }

    /// Make sure the data directory exists and holds an account.
    ///
    /// A missing account is created with an empty password; these nodes are
    /// throwaway test environments.
    pub fn bootstrap(&self) -> Result<Account> {
        let datadir = self.config.datadir();
        if !datadir.exists() {
            info!(datadir = %datadir.display(), "creating data directory");
            fs::create_dir_all(&datadir)
                .map_err(|err| Error::io(err, format!("failed to create {}", datadir.display())))?;
        }

        if let Some(account) = self.account()? {
            return Ok(account);
        }

        info!("no account found, creating one");
        let password = self.config.password_path();
        write_empty_password(&password)?;
        process::output(
            &self.config.binary,
            [
                self.datadir_arg(),
                "account".into(),
                "new".into(),
                "--password".into(),
                password.display().to_string(),
            ],
        )
        .map_err(|err| Error::io(err, format!("failed to run {}", self.config.binary.display())))?;

        self.account()?.ok_or(Error::AccountUnavailable { datadir })
    }

    /// Bootstrap if needed, then open the console in a detached terminal.
    pub fn launch(&self) -> Result<Option<Account>> {
        let account = if self.config.network.is_local() {
            let datadir = self.config.datadir();
            if !datadir.join("genesis.json").exists() {
                warn!(datadir = %datadir.display(), "no genesis.json; the node must already be initialized");
            }
            Some(self.bootstrap()?)
        } else {
            None
        };

        let argv = self.config.terminal_argv(account.as_ref());
        info!(network = %self.config.network, port = self.config.port, "launching console");
        process::spawn_detached(&argv)?;
        Ok(account)
    }
}

fn write_empty_password(path: &Path) -> Result<()> {
    fs::write(path, "\n").map_err(|err| Error::io(err, format!("failed to write {}", path.display())))
}
