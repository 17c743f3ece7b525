//! Package baseline: sudo, upgrades, the standard toolset, swap

use converge::{Action, Detection, Result, Run, Steps, shell};

use super::{MARKER_DIR, SYSCTL_CONF, absent_if_identified};

/// `sudo` itself, installed unprivileged (fresh Debian logs in as root)
#[derive(Debug)]
pub struct SudoPackage;

impl Action for SudoPackage {
    fn name(&self) -> &'static str {
        "sudo"
    }

    fn description(&self) -> String {
        "Install sudo".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        Ok(Detection::from_probe(run.has_binary("sudo")?, ""))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        steps.user("apt-get install sudo -y")?;
        Ok(())
    }
}

/// Fresh package index and nothing left to upgrade
#[derive(Debug)]
pub struct AptUpgrade {
    max_age_minutes: u64,
}

impl AptUpgrade {
    pub fn new(max_age_minutes: u64) -> Self {
        Self { max_age_minutes }
    }

    fn index_fresh(&self) -> String {
        format!(
            "find /var/cache/apt/pkgcache.bin -mmin -{} | grep -q .",
            self.max_age_minutes
        )
    }
}

/// Simulated upgrade; prints the number of packages it would install
pub const PENDING_UPGRADES: &str = "apt-get -s upgrade 2>/dev/null | grep -c '^Inst '";

impl Action for AptUpgrade {
    fn name(&self) -> &'static str {
        "apt-upgrade"
    }

    fn description(&self) -> String {
        "Update the package index and upgrade packages".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        if !run.holds(&self.index_fresh())? {
            return Ok(Detection::Absent);
        }
        let pending = run
            .probe(PENDING_UPGRADES)?
            .first_line()
            .parse::<usize>()
            .unwrap_or(0);
        if pending > 0 {
            log::info!("{pending} package(s) can be upgraded");
            return Ok(Detection::Absent);
        }
        Ok(Detection::satisfied("packages up to date"))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        steps.required(&shell::apt_update())?;
        steps.required(&shell::noninteractive(
            "apt-get -yq -o Dpkg::Options::=\"--force-confdef\" \
             -o Dpkg::Options::=\"--force-confold\" upgrade",
        ))?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct BaselinePackages {
    packages: Vec<String>,
}

impl BaselinePackages {
    pub fn new(packages: &[String]) -> Self {
        Self {
            packages: packages.to_vec(),
        }
    }
}

impl Action for BaselinePackages {
    fn name(&self) -> &'static str {
        "baseline-packages"
    }

    fn description(&self) -> String {
        format!("Install {} baseline packages", self.packages.len())
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        if self.packages.is_empty() {
            return Ok(Detection::satisfied("no packages configured"));
        }
        Ok(Detection::from_probe(
            run.holds(&shell::dpkg_installed(&self.packages))?,
            "",
        ))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        steps.required(&shell::apt_install(&self.packages))?;
        Ok(())
    }
}

/// A prebuilt `.deb` newer than the distribution's, with apt as fallback
#[derive(Debug)]
pub struct LatestPackage {
    package: &'static str,
    base_url: String,
    tries: u32,
}

impl LatestPackage {
    pub fn new(package: &'static str, base_url: &str, tries: u32) -> Self {
        Self {
            package,
            base_url: base_url.trim_end_matches('/').to_string(),
            tries,
        }
    }

    pub fn marker(&self) -> String {
        format!("{MARKER_DIR}/latest-{}", self.package)
    }
}

impl Action for LatestPackage {
    fn name(&self) -> &'static str {
        match self.package {
            "tmux" => "latest-tmux",
            _ => "latest-package",
        }
    }

    fn description(&self) -> String {
        format!("Install the latest {} build", self.package)
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        if run.has_file(&self.marker())? {
            return Ok(Detection::satisfied(""));
        }
        absent_if_identified(run)
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        let facts = steps.facts()?;
        let url = format!(
            "{}/{}/{}/{}/latest.deb",
            self.base_url, facts.distribution_id, facts.release, self.package
        );
        let deb = format!("/tmp/hostprep-{}.deb", self.package);

        if steps.attempt(&shell::wget(&url, &deb, self.tries))?.succeeded {
            steps.required(&format!("dpkg -i {}", shell::quote(&deb)))?;
        } else {
            steps.note(format!(
                "No prebuilt {} for {} {}, using apt",
                self.package, facts.distribution_id, facts.release
            ));
            steps.required(&format!("apt-get install -y {}", shell::quote(self.package)))?;
        }

        steps.required(&format!(
            "{} && {}",
            shell::mkdir_p(MARKER_DIR),
            shell::touch(&self.marker())
        ))?;
        Ok(())
    }
}

/// `add-apt-repository`, needed by later repository-based installs
#[derive(Debug)]
pub struct SoftwareProperties;

impl Action for SoftwareProperties {
    fn name(&self) -> &'static str {
        "software-properties"
    }

    fn description(&self) -> String {
        "Install software-properties-common".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        Ok(Detection::from_probe(run.has_binary("add-apt-repository")?, ""))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        steps.best_effort(&shell::apt_install(&["software-properties-common"]))?;
        Ok(())
    }
}

/// A swap file of `size_gb` gigabytes, active now and after reboot
#[derive(Debug)]
pub struct Swap {
    size_gb: u32,
}

impl Swap {
    pub fn new(size_gb: u32) -> Self {
        Self { size_gb }
    }

    pub fn path(&self) -> String {
        format!("/swap{}G", self.size_gb)
    }
}

impl Action for Swap {
    fn name(&self) -> &'static str {
        "swap"
    }

    fn description(&self) -> String {
        format!("Add {}G of swap", self.size_gb)
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        let path = self.path();
        Ok(Detection::from_probe(
            run.has_file(&path)?,
            format!("{path} already exists"),
        ))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        let path = self.path();
        let quoted = shell::quote(&path);
        steps.required(&format!("fallocate -l {}G {quoted}", self.size_gb))?;
        steps.required(&format!("chmod 600 {quoted}"))?;
        steps.required(&format!("mkswap {quoted}"))?;
        steps.required(&format!("swapon {quoted}"))?;
        steps.ensure_lines(SYSCTL_CONF, &["vm.swappiness=10"])?;
        steps.ensure_lines("/etc/fstab", &[format!("{path} none swap sw 0 0")])?;
        Ok(())
    }
}
