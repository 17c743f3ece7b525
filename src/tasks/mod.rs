//! Task registration table
//!
//! Every selectable task is a [`TaskId`]; [`TaskCatalog`] maps it to the
//! concrete actions it runs. Groups such as `debian` and `env` expand to
//! several actions in a fixed order.

pub mod apps;
pub mod base;
pub mod tuning;

use converge::{BoxedAction, Catalog, Detection, Run};
use std::path::PathBuf;
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::config::{Config, ProvisionConfig};

/// Marker directory for actions whose end-state has no natural probe
pub const MARKER_DIR: &str = "/var/lib/hostprep";

pub const SYSCTL_CONF: &str = "/etc/sysctl.conf";

/// A selectable task name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, IntoStaticStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum TaskId {
    Aptget,
    Env,
    Debian,
    Optional,
    #[strum(to_string = "letsencrypt", serialize = "certbot")]
    Letsencrypt,
    Nodejs,
    Yarn,
    Mysql,
    Mongodb,
    Redis,
    Mariadb,
    Solc,
    Mono,
    Go,
    Nginx,
    Docker,
    Python3,
    Bbr,
    Ipv6,
}

impl TaskId {
    pub fn description(self) -> &'static str {
        match self {
            Self::Aptget => "Refresh the package index and upgrade installed packages",
            Self::Env => "Dotfiles, timezone, limits, rc.local, sysctl, release prompt",
            Self::Debian => "Baseline packages and tuning for a fresh host",
            Self::Optional => "MySQL and MongoDB",
            Self::Letsencrypt => "certbot-auto for Let's Encrypt certificates",
            Self::Nodejs => "Node.js from the configured release line",
            Self::Yarn => "Yarn from its apt repository",
            Self::Mysql => "MySQL server and client",
            Self::Mongodb => "MongoDB from the upstream repository (64-bit only)",
            Self::Redis => "Redis server",
            Self::Mariadb => "MariaDB server (replaces MySQL)",
            Self::Solc => "Solidity compiler",
            Self::Mono => "Mono development tools",
            Self::Go => "Go toolchain under /usr/local/go",
            Self::Nginx => "nginx from the upstream repository",
            Self::Docker => "Docker CE with log rotation (64-bit only)",
            Self::Python3 => "Python 3 built from source with altinstall",
            Self::Bbr => "TCP BBR congestion control (kernel 4.9+)",
            Self::Ipv6 => "Disable IPv6",
        }
    }
}

/// Resolves task names to actions configured for one run
pub struct TaskCatalog<'c> {
    config: &'c ProvisionConfig,
    payload_dir: PathBuf,
}

impl<'c> TaskCatalog<'c> {
    pub fn new(config: &'c Config) -> Self {
        Self {
            config: &config.provision,
            payload_dir: config.payload_dir(),
        }
    }

    fn payload(&self, name: &str) -> PathBuf {
        self.payload_dir.join(name)
    }

    /// Actions registered for `task`, in execution order
    pub fn actions(&self, task: TaskId) -> Vec<BoxedAction> {
        let c = self.config;
        match task {
            TaskId::Aptget => vec![Box::new(base::AptUpgrade::new(c.apt_index_max_age_minutes))],
            TaskId::Env => self.env(),
            TaskId::Debian => self.debian(),
            TaskId::Optional => {
                let mut actions = self.actions(TaskId::Mysql);
                actions.extend(self.actions(TaskId::Mongodb));
                actions
            }
            TaskId::Letsencrypt => vec![Box::new(apps::Certbot::new(c.wget_tries))],
            TaskId::Nodejs => vec![Box::new(apps::Nodejs::new(&c.node_channel, c.wget_tries))],
            TaskId::Yarn => vec![Box::new(apps::Yarn)],
            TaskId::Mysql => vec![Box::new(apps::Mysql::new(&c.database_root_password))],
            TaskId::Mongodb => vec![Box::new(apps::Mongodb::new(&c.mongodb_series))],
            TaskId::Redis => vec![Box::new(apps::Redis)],
            TaskId::Mariadb => vec![Box::new(apps::Mariadb::new(
                &c.mariadb_series,
                &c.database_root_password,
            ))],
            TaskId::Solc => vec![Box::new(apps::Solc)],
            TaskId::Mono => vec![Box::new(apps::Mono)],
            TaskId::Go => vec![Box::new(apps::Go::new(&c.go_url, c.wget_tries))],
            TaskId::Nginx => vec![Box::new(apps::Nginx::new(self.payload("nginx.conf.example")))],
            TaskId::Docker => vec![Box::new(apps::Docker)],
            TaskId::Python3 => vec![Box::new(apps::Python3::new(&c.python_url, c.wget_tries))],
            TaskId::Bbr => vec![Box::new(tuning::Bbr)],
            TaskId::Ipv6 => vec![Box::new(tuning::DisableIpv6)],
        }
    }

    fn env(&self) -> Vec<BoxedAction> {
        let c = self.config;
        vec![
            Box::new(tuning::Dotfiles::new(&c.dotfiles_repo)),
            Box::new(tuning::Timezone::new(&c.timezone)),
            Box::new(tuning::Limits),
            Box::new(tuning::RcLocal::new(self.payload("rc-local.service"))),
            Box::new(tuning::Sysctl),
            Box::new(tuning::ReleaseUpgradePrompt),
        ]
    }

    fn debian(&self) -> Vec<BoxedAction> {
        let c = self.config;
        let mut actions: Vec<BoxedAction> = vec![
            Box::new(base::SudoPackage),
            Box::new(base::AptUpgrade::new(c.apt_index_max_age_minutes)),
            Box::new(base::BaselinePackages::new(&c.baseline_packages)),
            Box::new(base::LatestPackage::new(
                "tmux",
                &c.latest_packages_base,
                c.wget_tries,
            )),
            Box::new(base::SoftwareProperties),
        ];
        actions.extend(self.env());
        actions.push(Box::new(tuning::Bbr));
        actions
    }
}

impl Catalog for TaskCatalog<'_> {
    fn resolve(&self, name: &str) -> Option<Vec<BoxedAction>> {
        TaskId::from_str(name).ok().map(|task| self.actions(task))
    }

    fn default_sequence(&self) -> Vec<BoxedAction> {
        let mut actions: Vec<BoxedAction> = Vec::new();
        if self.config.disable_ipv6 {
            actions.push(Box::new(tuning::DisableIpv6));
        }
        actions.extend(self.debian());
        actions
    }

    fn names(&self) -> Vec<&'static str> {
        TaskId::iter().map(Into::into).collect()
    }
}

/// `Absent` when the distribution is identified, otherwise unsupported
///
/// Actions that write the distribution, release or codename into an apt
/// source or a download URL finish their detection with this.
pub(crate) fn absent_if_identified(run: &Run<'_>) -> converge::Result<Detection> {
    let facts = run.facts()?;
    if facts.is_known() {
        return Ok(Detection::Absent);
    }
    Ok(Detection::unsupported(format!(
        "cannot identify the distribution (lsb_release answered {}/{}/{})",
        facts.distribution_id, facts.release, facts.codename
    )))
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::config::Config;
    use std::path::PathBuf;

    /// Config whose payload dir is the repository's `payload/`
    pub fn config() -> Config {
        Config {
            payload_dir: Some(
                PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                    .join("payload")
                    .display()
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}
