//! System tuning: shell environment, limits, boot script, kernel knobs

use converge::{Action, Detection, Result, Run, Steps, Version, shell};
use std::path::PathBuf;

use super::SYSCTL_CONF;

const LIMITS_CONF: &str = "/etc/security/limits.conf";

const LIMITS: [&str; 4] = [
    "*    soft    nofile  500000",
    "*    hard    nofile  500000",
    "root soft    nofile  500000",
    "root hard    nofile  500000",
];

const PAM_SESSIONS: [&str; 2] = [
    "/etc/pam.d/common-session",
    "/etc/pam.d/common-session-noninteractive",
];

const PAM_LIMITS: &str = "session required pam_limits.so";

const RC_LOCAL: &str = "/etc/rc.local";

const HUGEPAGE_OFF: &str = "echo never > /sys/kernel/mm/transparent_hugepage/enabled";

const KERNEL_KNOBS: [&str; 3] = [
    "vm.overcommit_memory = 1",
    "net.core.somaxconn = 65535",
    "fs.file-max = 6553560",
];

const IPV6_OFF: [&str; 3] = [
    "net.ipv6.conf.all.disable_ipv6 = 1",
    "net.ipv6.conf.default.disable_ipv6 = 1",
    "net.ipv6.conf.lo.disable_ipv6 = 1",
];

const BBR: [&str; 2] = [
    "net.core.default_qdisc = fq",
    "net.ipv4.tcp_congestion_control = bbr",
];

const RELEASE_UPGRADES: &str = "/etc/update-manager/release-upgrades";

#[derive(Debug)]
pub struct DisableIpv6;

impl Action for DisableIpv6 {
    fn name(&self) -> &'static str {
        "disable-ipv6"
    }

    fn description(&self) -> String {
        "Disable IPv6".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        let missing = run.missing_lines(SYSCTL_CONF, &IPV6_OFF)?;
        Ok(Detection::from_probe(missing.is_empty(), ""))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        steps.ensure_lines(SYSCTL_CONF, &IPV6_OFF)?;
        steps.required("sysctl -p")?;
        Ok(())
    }
}

/// The login user's dotfiles, cloned and bootstrapped
#[derive(Debug)]
pub struct Dotfiles {
    repo: String,
}

impl Dotfiles {
    pub fn new(repo: &str) -> Self {
        Self {
            repo: repo.to_string(),
        }
    }
}

impl Action for Dotfiles {
    fn name(&self) -> &'static str {
        "dotfiles"
    }

    fn description(&self) -> String {
        "Install dotfiles".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        Ok(Detection::from_probe(run.has_file("~/.tmux.conf")?, ""))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        steps.user_best_effort(&format!(
            "cd ~ && git clone --single-branch --recursive {} dotfiles && bash dotfiles/bootstrap.sh -f",
            shell::quote(&self.repo)
        ))?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct Timezone {
    zone: String,
}

impl Timezone {
    pub fn new(zone: &str) -> Self {
        Self {
            zone: zone.to_string(),
        }
    }

    fn zoneinfo(&self) -> String {
        format!("/usr/share/zoneinfo/{}", self.zone)
    }
}

impl Action for Timezone {
    fn name(&self) -> &'static str {
        "timezone"
    }

    fn description(&self) -> String {
        format!("Set the timezone to {}", self.zone)
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        let zoneinfo = self.zoneinfo();
        if !run.has_file(&zoneinfo)? {
            return Ok(Detection::unsupported(format!("unknown timezone {}", self.zone)));
        }
        let same = run.holds(&format!("cmp -s {} /etc/localtime", shell::quote(&zoneinfo)))?;
        Ok(Detection::from_probe(same, format!("already {}", self.zone)))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        steps.best_effort(&format!("cp {} /etc/localtime", shell::quote(&self.zoneinfo())))?;
        Ok(())
    }
}

/// Raised open-file limits, applied to PAM sessions
#[derive(Debug)]
pub struct Limits;

impl Limits {
    /// PAM session files that exist but do not load `pam_limits`
    fn unpatched_sessions(run: &Run<'_>) -> Result<Vec<&'static str>> {
        let mut unpatched = Vec::new();
        for path in PAM_SESSIONS {
            if run.has_file(path)? && !run.has_line(path, PAM_LIMITS)? {
                unpatched.push(path);
            }
        }
        Ok(unpatched)
    }
}

impl Action for Limits {
    fn name(&self) -> &'static str {
        "limits"
    }

    fn description(&self) -> String {
        "Raise open-file limits".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        let limits_set = run.missing_lines(LIMITS_CONF, &LIMITS)?.is_empty();
        let pam_done = Self::unpatched_sessions(run)?.is_empty();
        Ok(Detection::from_probe(limits_set && pam_done, ""))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        if !steps.run().missing_lines(LIMITS_CONF, &LIMITS)?.is_empty() {
            steps.required(&shell::write_file(LIMITS_CONF, &LIMITS))?;
        }
        for path in Self::unpatched_sessions(steps.run())? {
            steps.required(&shell::append_lines(path, &[PAM_LIMITS]))?;
        }
        Ok(())
    }
}

/// How `/etc/rc.local` gets run at boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStrategy {
    /// systemd unit `rc-local.service` (15.04 and later)
    Systemd,
    /// The distribution's own init script
    InitScript,
}

/// `/etc/rc.local` turning off transparent hugepages at boot
#[derive(Debug)]
pub struct RcLocal {
    unit: PathBuf,
}

impl RcLocal {
    pub fn new(unit: PathBuf) -> Self {
        Self { unit }
    }

    pub fn strategy(run: &Run<'_>) -> Result<BootStrategy> {
        if run.facts()?.release_at_least("15.04") {
            Ok(BootStrategy::Systemd)
        } else {
            Ok(BootStrategy::InitScript)
        }
    }
}

impl Action for RcLocal {
    fn name(&self) -> &'static str {
        "rc-local"
    }

    fn description(&self) -> String {
        "Enable rc.local and disable transparent hugepages".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        let line_present = run.has_line(RC_LOCAL, HUGEPAGE_OFF)?;
        let enabled = match Self::strategy(run)? {
            BootStrategy::Systemd => run.holds("systemctl is-enabled rc-local")?,
            BootStrategy::InitScript => true,
        };
        Ok(Detection::from_probe(line_present && enabled, ""))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        let strategy = Self::strategy(steps.run())?;
        if strategy == BootStrategy::Systemd {
            steps.require_payload(&self.unit)?;
            steps.put(&self.unit, "/etc/systemd/system/")?;
        }

        if !steps.run().holds(&shell::test_nonempty(RC_LOCAL))? {
            steps.required(&shell::write_file(RC_LOCAL, &["#!/bin/sh", "exit 0"]))?;
        } else if !steps.run().holds(&format!("head -1 {RC_LOCAL} | grep -q '^#!'"))? {
            steps.required(&format!("sed -i {} {RC_LOCAL}", shell::quote("1i #!/bin/sh")))?;
        }

        if !steps.run().has_line(RC_LOCAL, HUGEPAGE_OFF)? {
            steps.required(&format!("sed -i {} {RC_LOCAL}", shell::quote("/^exit 0/d")))?;
            steps.required(&shell::append_lines(RC_LOCAL, &[HUGEPAGE_OFF, "exit 0"]))?;
        }

        steps.required(&format!("chmod +x {RC_LOCAL}"))?;
        if strategy == BootStrategy::Systemd {
            steps.required("systemctl enable rc-local")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Sysctl;

impl Action for Sysctl {
    fn name(&self) -> &'static str {
        "sysctl"
    }

    fn description(&self) -> String {
        "Tune kernel parameters".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        let missing = run.missing_lines(SYSCTL_CONF, &KERNEL_KNOBS)?;
        Ok(Detection::from_probe(missing.is_empty(), ""))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        steps.ensure_lines(SYSCTL_CONF, &KERNEL_KNOBS)?;
        steps.required("sysctl -p")?;
        Ok(())
    }
}

/// Ubuntu's "new release available" prompt, turned off
#[derive(Debug)]
pub struct ReleaseUpgradePrompt;

impl Action for ReleaseUpgradePrompt {
    fn name(&self) -> &'static str {
        "release-upgrade-prompt"
    }

    fn description(&self) -> String {
        "Disable the release upgrade prompt".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        if !run.has_file(RELEASE_UPGRADES)? {
            return Ok(Detection::unsupported("no update-manager on this host"));
        }
        Ok(Detection::from_probe(
            run.has_line(RELEASE_UPGRADES, "Prompt=never")?,
            "",
        ))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        steps.best_effort(&format!(
            "sed -i {} {RELEASE_UPGRADES}",
            shell::quote("s/^Prompt.*/Prompt=never/")
        ))?;
        Ok(())
    }
}

/// TCP BBR congestion control
#[derive(Debug)]
pub struct Bbr;

impl Action for Bbr {
    fn name(&self) -> &'static str {
        "bbr"
    }

    fn description(&self) -> String {
        "Enable TCP BBR".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        let current = run.probe("sysctl -n net.ipv4.tcp_congestion_control")?;
        if current.succeeded && current.first_line() == "bbr" {
            return Ok(Detection::satisfied("bbr is the congestion control"));
        }

        let Some(kernel) = run.query("uname -r")? else {
            return Ok(Detection::unsupported("cannot tell the running kernel version"));
        };
        let supported = Version::parse(&kernel).is_ok_and(|v| v.at_least("4.9"));
        if !supported {
            return Ok(Detection::unsupported(format!(
                "bbr needs linux 4.9+, please upgrade your kernel (running {kernel})"
            )));
        }
        Ok(Detection::Absent)
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        steps.ensure_lines(SYSCTL_CONF, &BBR)?;
        steps.required("sysctl -p")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::sim::{Effect, SimHost, idempotence_check};
    use converge::{CommandResult, NoReport, Outcome, apply};
    use pretty_assertions::assert_eq;

    fn unit() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("payload/rc-local.service")
    }

    #[test]
    fn test_disable_ipv6_idempotent() {
        let host = SimHost::ubuntu("18.04", "bionic");
        host.add_file(SYSCTL_CONF, &["net.ipv6.conf.all.disable_ipv6 = 1"]);

        let check = idempotence_check(&DisableIpv6, &host);

        assert_eq!(check.first, Outcome::Done);
        assert!(matches!(check.second, Outcome::AlreadySatisfied { .. }));
        assert_eq!(check.second_calls, check.detection_calls);
        assert_eq!(host.file_lines(SYSCTL_CONF).unwrap().len(), 3);
        assert_eq!(host.count_matching("sysctl -p"), 1);
    }

    #[test]
    fn test_sysctl_appends_only_missing() {
        let host = SimHost::ubuntu("18.04", "bionic");
        host.add_file(SYSCTL_CONF, &["# defaults", "net.core.somaxconn = 65535"]);

        let outcome = apply(&Sysctl, &Run::new(&host), &mut NoReport);

        assert_eq!(outcome, Outcome::Done);
        assert_eq!(
            host.file_lines(SYSCTL_CONF).unwrap(),
            vec![
                "# defaults",
                "net.core.somaxconn = 65535",
                "vm.overcommit_memory = 1",
                "fs.file-max = 6553560",
            ]
        );
    }

    #[test]
    fn test_sysctl_idempotent() {
        let host = SimHost::ubuntu("18.04", "bionic");

        let check = idempotence_check(&Sysctl, &host);

        assert_eq!(check.first, Outcome::Done);
        assert!(matches!(check.second, Outcome::AlreadySatisfied { .. }));
        assert_eq!(check.second_calls, check.detection_calls);
        assert_eq!(host.file_lines(SYSCTL_CONF).unwrap(), KERNEL_KNOBS.to_vec());
        assert_eq!(host.count_matching("sysctl -p"), 1);
    }

    #[test]
    fn test_dotfiles_idempotent() {
        let host = SimHost::ubuntu("18.04", "bionic");
        host.effect("bootstrap.sh", Effect::CreatesFile("~/.tmux.conf".into()));

        let check = idempotence_check(&Dotfiles::new("https://example.com/dotfiles.git"), &host);

        assert_eq!(check.first, Outcome::Done);
        assert!(matches!(check.second, Outcome::AlreadySatisfied { .. }));
        assert_eq!(check.second_calls, check.detection_calls);
        assert_eq!(host.count_matching("git clone"), 1);
    }

    #[test]
    fn test_dotfiles_failure_is_partial() {
        let host = SimHost::ubuntu("18.04", "bionic");
        host.script("git clone", CommandResult::failed_with("fatal: unable to access"));

        let outcome = apply(&Dotfiles::new("https://example.com/dotfiles.git"), &Run::new(&host), &mut NoReport);

        assert!(matches!(outcome, Outcome::PartiallyFailed { .. }));
        assert!(host.elevated_calls().is_empty());
    }

    #[test]
    fn test_unknown_timezone_unsupported() {
        let host = SimHost::ubuntu("18.04", "bionic");

        let outcome = apply(&Timezone::new("Mars/Olympus"), &Run::new(&host), &mut NoReport);

        assert!(matches!(outcome, Outcome::Unsupported { .. }));
        assert!(host.elevated_calls().is_empty());
    }

    #[test]
    fn test_timezone_copied_when_different() {
        let host = SimHost::ubuntu("18.04", "bionic");
        host.add_file("/usr/share/zoneinfo/UTC", &[]);
        host.script("cmp -s", CommandResult::failed_with(""));
        host.effect(
            "cp /usr/share/zoneinfo/UTC /etc/localtime",
            Effect::Answers {
                pattern: "cmp -s".into(),
                result: CommandResult::ok(""),
            },
        );

        let check = idempotence_check(&Timezone::new("UTC"), &host);

        assert_eq!(check.first, Outcome::Done);
        assert_eq!(
            check.second,
            Outcome::AlreadySatisfied {
                details: "already UTC".into()
            }
        );
        assert_eq!(check.second_calls, check.detection_calls);
        assert_eq!(host.count_matching("cp /usr/share/zoneinfo/UTC /etc/localtime"), 1);
    }

    #[test]
    fn test_limits_patch_existing_pam_files() {
        let host = SimHost::ubuntu("18.04", "bionic");
        host.add_file(LIMITS_CONF, &["# /etc/security/limits.conf"]);
        host.add_file(PAM_SESSIONS[0], &["session optional pam_umask.so"]);

        let check = idempotence_check(&Limits, &host);

        assert_eq!(check.first, Outcome::Done);
        assert!(matches!(check.second, Outcome::AlreadySatisfied { .. }));
        assert_eq!(host.file_lines(LIMITS_CONF).unwrap(), LIMITS.to_vec());
        assert_eq!(
            host.file_lines(PAM_SESSIONS[0]).unwrap(),
            vec!["session optional pam_umask.so", PAM_LIMITS]
        );
        assert!(host.file_lines(PAM_SESSIONS[1]).is_none());
    }

    #[test]
    fn test_rc_local_systemd() {
        let host = SimHost::ubuntu("16.04", "xenial");
        host.add_file(RC_LOCAL, &["#!/bin/sh -e", "exit 0"]);

        let check = idempotence_check(&RcLocal::new(unit()), &host);

        assert_eq!(check.first, Outcome::Done);
        assert!(matches!(check.second, Outcome::AlreadySatisfied { .. }));
        assert_eq!(check.second_calls, check.detection_calls);
        assert_eq!(
            host.file_lines(RC_LOCAL).unwrap(),
            vec!["#!/bin/sh -e", HUGEPAGE_OFF, "exit 0"]
        );
        assert_eq!(host.uploads().len(), 1);
        assert_eq!(host.uploads()[0].1, "/etc/systemd/system/rc-local.service");
        assert_eq!(host.count_matching("systemctl enable rc-local"), 1);
    }

    #[test]
    fn test_rc_local_init_script_on_old_release() {
        let host = SimHost::ubuntu("14.04", "trusty");

        let outcome = apply(&RcLocal::new(unit()), &Run::new(&host), &mut NoReport);

        assert_eq!(outcome, Outcome::Done);
        assert!(host.uploads().is_empty());
        assert_eq!(host.count_matching("systemctl"), 0);
        assert_eq!(
            host.file_lines(RC_LOCAL).unwrap(),
            vec!["#!/bin/sh", HUGEPAGE_OFF, "exit 0"]
        );
    }

    #[test]
    fn test_rc_local_adds_missing_shebang() {
        let host = SimHost::ubuntu("18.04", "bionic");
        host.add_file(RC_LOCAL, &["exit 0"]);
        host.script("head -1", CommandResult::failed_with(""));

        let outcome = apply(&RcLocal::new(unit()), &Run::new(&host), &mut NoReport);

        assert_eq!(outcome, Outcome::Done);
        assert_eq!(
            host.file_lines(RC_LOCAL).unwrap(),
            vec!["#!/bin/sh", HUGEPAGE_OFF, "exit 0"]
        );
    }

    #[test]
    fn test_release_prompt_absent_file_unsupported() {
        let host = SimHost::debian("10", "buster");
        let outcome = apply(&ReleaseUpgradePrompt, &Run::new(&host), &mut NoReport);
        assert!(matches!(outcome, Outcome::Unsupported { .. }));
    }

    #[test]
    fn test_release_prompt_rewritten() {
        let host = SimHost::ubuntu("18.04", "bionic");
        host.add_file(RELEASE_UPGRADES, &["[DEFAULT]", "Prompt=lts"]);

        let check = idempotence_check(&ReleaseUpgradePrompt, &host);

        assert_eq!(check.first, Outcome::Done);
        assert!(matches!(check.second, Outcome::AlreadySatisfied { .. }));
        assert_eq!(
            host.file_lines(RELEASE_UPGRADES).unwrap(),
            vec!["[DEFAULT]", "Prompt=never"]
        );
    }

    #[test]
    fn test_bbr_old_kernel_unsupported() {
        let host = SimHost::ubuntu("16.04", "xenial");
        host.script("uname -r", CommandResult::ok("4.4.0-21-generic\n"));

        let outcome = apply(&Bbr, &Run::new(&host), &mut NoReport);

        assert_eq!(
            outcome,
            Outcome::Unsupported {
                reason: "bbr needs linux 4.9+, please upgrade your kernel (running 4.4.0-21-generic)".into()
            }
        );
        assert!(host.elevated_calls().is_empty());
    }

    #[test]
    fn test_bbr_unknown_kernel_unsupported() {
        let host = SimHost::ubuntu("18.04", "bionic");
        host.script("uname -r", CommandResult::failed_with("uname: not found"));

        let outcome = apply(&Bbr, &Run::new(&host), &mut NoReport);

        assert!(matches!(outcome, Outcome::Unsupported { .. }), "{outcome:?}");
        assert!(host.elevated_calls().is_empty());
    }

    #[test]
    fn test_bbr_enabled_on_new_kernel() {
        let host = SimHost::ubuntu("18.04", "bionic");
        host.script("uname -r", CommandResult::ok("4.15.0-20-generic\n"));

        let outcome = apply(&Bbr, &Run::new(&host), &mut NoReport);
        assert_eq!(outcome, Outcome::Done);
        assert_eq!(host.file_lines(SYSCTL_CONF).unwrap(), BBR.to_vec());

        host.script("sysctl -n net.ipv4.tcp_congestion_control", CommandResult::ok("bbr\n"));
        let before = host.call_count();
        let again = apply(&Bbr, &Run::new(&host), &mut NoReport);
        assert!(matches!(again, Outcome::AlreadySatisfied { .. }));
        assert!(host.elevated_calls_since(before).is_empty());
    }
}
