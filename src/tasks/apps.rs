//! Application installs
//!
//! Each app is detected by its binary (or a file the package drops) and
//! installed from the distribution, an upstream apt repository, or a
//! release tarball.

use converge::{Action, Detection, Error, Result, Run, Steps, shell};
use std::cell::OnceCell;
use std::path::PathBuf;

use super::absent_if_identified;

const KEYSERVER: &str = "hkp://keyserver.ubuntu.com:80";

/// Fetch a signing key from the Ubuntu keyserver
fn recv_key(key: &str) -> String {
    format!("apt-key adv --keyserver {KEYSERVER} --recv-keys {key}")
}

/// Pipe a downloaded ASCII key into `apt-key`
fn add_key_from(url: &str) -> String {
    format!("curl -fsSL {} | apt-key add -", shell::quote(url))
}

fn add_repository(line: &str) -> String {
    format!("add-apt-repository -y {}", shell::quote(line))
}

fn root_password_selections(package: &str, password: &str) -> [String; 2] {
    [
        format!("{package} mysql-server/root_password password {password}"),
        format!("{package} mysql-server/root_password_again password {password}"),
    ]
}

const CERTBOT: &str = "/usr/bin/certbot-auto";
const CERTBOT_URL: &str = "https://dl.eff.org/certbot-auto";

/// `certbot-auto` for Let's Encrypt certificates
#[derive(Debug)]
pub struct Certbot {
    tries: u32,
}

impl Certbot {
    pub fn new(tries: u32) -> Self {
        Self { tries }
    }
}

impl Action for Certbot {
    fn name(&self) -> &'static str {
        "letsencrypt"
    }

    fn description(&self) -> String {
        "Install certbot-auto".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        Ok(Detection::from_probe(
            run.holds(&shell::test_executable(CERTBOT))?,
            "",
        ))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        if steps.best_effort(&shell::wget(CERTBOT_URL, CERTBOT, self.tries))?.failed() {
            // wget leaves an empty file behind
            steps.best_effort(&format!("rm -f {CERTBOT}"))?;
            return Ok(());
        }
        steps.required(&format!("chmod +x {CERTBOT}"))?;

        let path = steps.user("echo $PATH")?.first_line().to_string();
        steps.note(
            "Usage:\n  new: certbot-auto -d example.com -d www.example.com --nginx\n  \
             renew: certbot-auto renew --no-self-upgrade",
        );
        steps.note(format!(
            "Crontab:\n  0 0 * * * PATH={path} {CERTBOT} renew -n --nginx --no-self-upgrade >> /tmp/certbot.log 2>&1"
        ));
        steps.note("After obtaining certs: chmod 755 /etc/letsencrypt/{live,archive}");
        Ok(())
    }
}

/// Node.js from a release line's prebuilt tarball
#[derive(Debug)]
pub struct Nodejs {
    channel: String,
    tries: u32,
    tarball: OnceCell<String>,
}

impl Nodejs {
    pub fn new(channel: &str, tries: u32) -> Self {
        Self {
            channel: channel.to_string(),
            tries,
            tarball: OnceCell::new(),
        }
    }

    /// Tarball name for the host's architecture, resolved once
    fn tarball(&self, run: &Run<'_>) -> Result<Option<String>> {
        if let Some(name) = self.tarball.get() {
            return Ok(Some(name.clone()));
        }

        let label = run.facts()?.architecture.download_label();
        let listing = run.probe(&format!(
            "curl -s https://nodejs.org/download/release/{}/SHASUMS256.txt | grep linux-{label}.tar.xz | awk '{{print $2}}'",
            self.channel
        ))?;
        let name = listing.first_line().to_string();
        if name.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.tarball.get_or_init(|| name).clone()))
    }
}

/// `node-v8.16.0-linux-x64.tar.xz` → `v8.16.0`
fn node_version(tarball: &str) -> Option<&str> {
    tarball.split('-').nth(1).filter(|v| v.starts_with('v'))
}

impl Action for Nodejs {
    fn name(&self) -> &'static str {
        "nodejs"
    }

    fn description(&self) -> String {
        format!("Install Node.js ({})", self.channel)
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        let Some(tarball) = self.tarball(run)? else {
            return Ok(Detection::unsupported(format!(
                "no Node.js build for {} in {}",
                run.facts()?.architecture,
                self.channel
            )));
        };
        let Some(version) = node_version(&tarball) else {
            return Ok(Detection::unsupported(format!("unexpected tarball name {tarball}")));
        };
        let installed = run.holds(&format!("which node && test \"$(node --version)\" = {version}"))?;
        Ok(Detection::from_probe(installed, format!("node {version}")))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        let tarball = self.tarball(steps.run())?.ok_or_else(|| Error::Probe {
            message: format!("Node.js tarball name for {} went missing", self.channel),
        })?;
        let url = format!("https://nodejs.org/dist/{}/{tarball}", self.channel);
        steps.user(&shell::wget(&url, "/tmp/node.tar.xz", self.tries))?;
        steps.required(
            "tar -C /usr/ --exclude CHANGELOG.md --exclude LICENSE --exclude README.md \
             --strip-components 1 -xf /tmp/node.tar.xz",
        )?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct Yarn;

impl Action for Yarn {
    fn name(&self) -> &'static str {
        "yarn"
    }

    fn description(&self) -> String {
        "Install Yarn".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        Ok(Detection::from_probe(run.has_binary("yarn")?, ""))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        steps.required(&add_key_from("https://dl.yarnpkg.com/debian/pubkey.gpg"))?;
        steps.required(&shell::apt_source(
            "yarn",
            &["deb https://dl.yarnpkg.com/debian/ stable main"],
        ))?;
        steps.required(&shell::apt_update_install(&["yarn"]))?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct Mysql {
    root_password: String,
}

impl Mysql {
    pub fn new(root_password: &str) -> Self {
        Self {
            root_password: root_password.to_string(),
        }
    }
}

impl Action for Mysql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn description(&self) -> String {
        "Install MySQL".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        Ok(Detection::from_probe(run.has_binary("mysqld")?, ""))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        for selection in root_password_selections("mysql-server", &self.root_password) {
            steps.required(&shell::debconf_set(&selection))?;
        }
        steps.required(&shell::noninteractive(&shell::apt_install(&[
            "libmysqld-dev",
            "mysql-server",
            "mysql-client",
            "libmysqlclient-dev",
        ])))?;
        Ok(())
    }
}

/// MongoDB from repo.mongodb.org (64-bit hosts only)
#[derive(Debug)]
pub struct Mongodb {
    series: String,
}

impl Mongodb {
    pub fn new(series: &str) -> Self {
        Self {
            series: series.to_string(),
        }
    }

    fn repo_line(&self, debian: bool, codename: &str) -> String {
        if debian {
            format!(
                "deb http://repo.mongodb.org/apt/debian {codename}/mongodb-org/{} main",
                self.series
            )
        } else {
            format!(
                "deb [ arch=amd64 ] https://repo.mongodb.org/apt/ubuntu {codename}/mongodb-org/{} multiverse",
                self.series
            )
        }
    }
}

impl Action for Mongodb {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    fn description(&self) -> String {
        format!("Install MongoDB {}", self.series)
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        if run.has_binary("mongod")? {
            return Ok(Detection::satisfied(""));
        }
        if !run.facts()?.is_64bit() {
            return Ok(Detection::unsupported("mongodb only supports 64bit system"));
        }
        absent_if_identified(run)
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        let facts = steps.facts()?;
        steps.required(&recv_key("9DA31620334BD75D9DCB49F368818C72E52529D4"))?;
        steps.required(&shell::apt_source(
            &format!("mongodb-org-{}", self.series),
            &[self.repo_line(facts.is_debian(), &facts.codename)],
        ))?;
        steps.required(&shell::apt_update_install(&["mongodb-org"]))?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct Redis;

impl Action for Redis {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn description(&self) -> String {
        "Install Redis".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        Ok(Detection::from_probe(run.has_binary("redis-server")?, ""))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        steps.required(&shell::apt_install(&["redis-server"]))?;
        Ok(())
    }
}

const MARIADB_CNF: &str = "/etc/mysql/conf.d/mariadb.cnf";

/// MariaDB from the OSU mirror; also migrates an existing MySQL
#[derive(Debug)]
pub struct Mariadb {
    series: String,
    root_password: String,
}

impl Mariadb {
    pub fn new(series: &str, root_password: &str) -> Self {
        Self {
            series: series.to_string(),
            root_password: root_password.to_string(),
        }
    }

    /// The repository signing key changed with 16.04
    pub fn signing_key(release_at_least_1604: bool) -> &'static str {
        if release_at_least_1604 {
            "0xF1656F24C74CD1D8"
        } else {
            "0xcbcb082a1bb943db"
        }
    }
}

impl Action for Mariadb {
    fn name(&self) -> &'static str {
        "mariadb"
    }

    fn description(&self) -> String {
        format!("Install MariaDB {}", self.series)
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        if run.has_file(MARIADB_CNF)? {
            return Ok(Detection::satisfied(""));
        }
        absent_if_identified(run)
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        let facts = steps.facts()?;
        for selection in root_password_selections("mariadb-server", &self.root_password) {
            steps.required(&shell::debconf_set(&selection))?;
        }
        steps.required(&recv_key(Self::signing_key(facts.release_at_least("16.04"))))?;
        steps.required(&shell::apt_install(&["software-properties-common"]))?;
        steps.required(&add_repository(&format!(
            "deb http://ftp.osuosl.org/pub/mariadb/repo/{}/{} {} main",
            self.series, facts.distribution_id, facts.codename
        )))?;
        steps.required(&shell::apt_update())?;
        steps.best_effort("service mysql stop")?;
        steps.best_effort(&shell::apt_install(&["mariadb-server", "libmysqld-dev"]))?;
        Ok(())
    }
}

/// Solidity compiler from the Ethereum PPA
#[derive(Debug)]
pub struct Solc;

impl Action for Solc {
    fn name(&self) -> &'static str {
        "solc"
    }

    fn description(&self) -> String {
        "Install the Solidity compiler".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        Ok(Detection::from_probe(run.has_binary("solc")?, ""))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        steps.required(&add_repository("ppa:ethereum/ethereum"))?;
        steps.required(&shell::apt_update_install(&["solc"]))?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct Mono;

impl Action for Mono {
    fn name(&self) -> &'static str {
        "mono"
    }

    fn description(&self) -> String {
        "Install Mono".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        if run.has_binary("mono")? {
            return Ok(Detection::satisfied(""));
        }
        absent_if_identified(run)
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        let codename = &steps.facts()?.codename;
        steps.best_effort(&recv_key("3FA7E0328081BFF6A14DA29AA6A19B38D3D831EF"))?;
        steps.best_effort(&shell::apt_source(
            "mono-official",
            &[format!("deb http://download.mono-project.com/repo/ubuntu {codename} main")],
        ))?;
        steps.required(&shell::apt_update_install(&["mono-devel"]))?;
        Ok(())
    }
}

const GO_ROOT_BIN: &str = "/usr/local/go/bin/go";
const GO_PATH_LINE: &str = "export PATH=$PATH:/usr/local/go/bin";

/// Go toolchain unpacked under `/usr/local/go`
#[derive(Debug)]
pub struct Go {
    url: String,
    tries: u32,
}

impl Go {
    pub fn new(url: &str, tries: u32) -> Self {
        Self {
            url: url.to_string(),
            tries,
        }
    }
}

impl Action for Go {
    fn name(&self) -> &'static str {
        "go"
    }

    fn description(&self) -> String {
        "Install Go".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        if run.has_binary("go")? {
            return Ok(Detection::satisfied("go on PATH"));
        }
        let unpacked = run.holds(&shell::test_executable(GO_ROOT_BIN))?
            && run.has_line("/etc/profile", GO_PATH_LINE)?;
        Ok(Detection::from_probe(unpacked, "go under /usr/local/go"))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        if !steps.run().holds(&shell::test_executable(GO_ROOT_BIN))? {
            steps.best_effort(&format!(
                "{} | tar -C /usr/local -xzf -",
                shell::wget(&self.url, "-", self.tries)
            ))?;
        }
        steps.ensure_lines("/etc/profile", &[GO_PATH_LINE])?;
        Ok(())
    }
}

/// nginx from nginx.org, with an example site config
#[derive(Debug)]
pub struct Nginx {
    example: PathBuf,
}

impl Nginx {
    pub fn new(example: PathBuf) -> Self {
        Self { example }
    }
}

impl Action for Nginx {
    fn name(&self) -> &'static str {
        "nginx"
    }

    fn description(&self) -> String {
        "Install nginx".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        if run.has_binary("nginx")? {
            return Ok(Detection::satisfied(""));
        }
        absent_if_identified(run)
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        steps.require_payload(&self.example)?;
        let facts = steps.facts()?;
        let (dist, codename) = (&facts.distribution_id, &facts.codename);

        steps.required(&add_key_from("https://nginx.org/keys/nginx_signing.key"))?;
        steps.required(&shell::apt_source(
            "nginx",
            &[
                format!("deb http://nginx.org/packages/{dist}/ {codename} nginx"),
                format!("deb-src http://nginx.org/packages/{dist}/ {codename} nginx"),
            ],
        ))?;
        steps.required(&shell::apt_update_install(&["nginx"]))?;
        steps.put(&self.example, "/etc/nginx/conf.d/")?;
        Ok(())
    }
}

const DOCKER_DAEMON_JSON: &str = "/etc/docker/daemon.json";

const DOCKER_LOG_ROTATION: [&str; 7] = [
    "{",
    "  \"log-driver\": \"json-file\",",
    "  \"log-opts\": {",
    "    \"max-size\": \"50m\",",
    "    \"max-file\": \"5\"",
    "  }",
    "}",
];

/// Docker CE from download.docker.com (64-bit hosts only)
#[derive(Debug)]
pub struct Docker;

impl Action for Docker {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn description(&self) -> String {
        "Install Docker CE".into()
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        if run.has_binary("docker")? {
            return Ok(Detection::satisfied(""));
        }
        if !run.facts()?.is_64bit() {
            return Ok(Detection::unsupported("docker only supports 64bit system"));
        }
        absent_if_identified(run)
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        let facts = steps.facts()?;
        let (dist, codename) = (&facts.distribution_id, &facts.codename);

        if facts.is_ubuntu() && facts.release == "14.04" {
            steps.required(&shell::apt_update())?;
            // $(uname -r) expands on the host
            steps.required("apt-get install -yq linux-image-extra-virtual linux-image-extra-$(uname -r)")?;
        }
        steps.required(&shell::apt_install(&[
            "apt-transport-https",
            "ca-certificates",
            "software-properties-common",
            "curl",
            "gnupg2",
        ]))?;
        steps.required(&add_key_from(&format!("https://download.docker.com/linux/{dist}/gpg")))?;
        steps.required(&add_repository(&format!(
            "deb [arch=amd64] https://download.docker.com/linux/{dist} {codename} stable"
        )))?;
        steps.required(&shell::apt_update_install(&["docker-ce"]))?;
        steps.required(&shell::write_file(DOCKER_DAEMON_JSON, &DOCKER_LOG_ROTATION))?;
        steps.best_effort("service docker restart")?;

        let user = steps.user("id -un")?.first_line().to_string();
        if !user.is_empty() && user != "root" {
            steps.best_effort(&format!("usermod -a -G docker {}", shell::quote(&user)))?;
        }
        steps.best_effort("pip install docker-compose")?;
        Ok(())
    }
}

const PYTHON_BUILD_DEPS: [&str; 11] = [
    "build-essential",
    "checkinstall",
    "libreadline-gplv2-dev",
    "libncursesw5-dev",
    "libssl-dev",
    "libsqlite3-dev",
    "tk-dev",
    "libgdbm-dev",
    "libc6-dev",
    "libbz2-dev",
    "libffi-dev",
];

/// Python 3 built from a source tarball, installed with `make altinstall`
#[derive(Debug)]
pub struct Python3 {
    url: String,
    tries: u32,
    version: Option<String>,
}

impl Python3 {
    pub fn new(url: &str, tries: u32) -> Self {
        Self {
            url: url.to_string(),
            tries,
            version: source_version(url),
        }
    }

    /// `python3.7` for 3.7.3
    fn binary(version: &str) -> String {
        let minor: Vec<&str> = version.split('.').take(2).collect();
        format!("python{}", minor.join("."))
    }
}

/// `.../Python-3.7.3.tgz` → `3.7.3`
fn source_version(url: &str) -> Option<String> {
    let file = url.rsplit('/').next()?.strip_prefix("Python-")?;
    let version: String = file
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let version = version.trim_end_matches('.');
    (!version.is_empty()).then(|| version.to_string())
}

impl Action for Python3 {
    fn name(&self) -> &'static str {
        "python3"
    }

    fn description(&self) -> String {
        match &self.version {
            Some(version) => format!("Build Python {version}"),
            None => "Build Python 3".into(),
        }
    }

    fn detect(&self, run: &Run<'_>) -> Result<Detection> {
        let Some(version) = &self.version else {
            return Ok(Detection::unsupported(format!(
                "cannot tell the Python version from {}",
                self.url
            )));
        };
        let binary = Self::binary(version);
        Ok(Detection::from_probe(run.has_binary(&binary)?, binary))
    }

    fn mutate(&self, steps: &mut Steps<'_, '_>) -> Result<()> {
        let version = self.version.as_deref().ok_or_else(|| Error::InvalidVersion {
            input: self.url.clone(),
        })?;
        let source = format!("/tmp/Python-{version}");

        steps.required(&format!("apt install -y {}", PYTHON_BUILD_DEPS.join(" ")))?;
        steps.user(&shell::wget(&self.url, "/tmp/py.tgz", self.tries))?;
        steps.user("cd /tmp && tar xf py.tgz")?;
        steps.required(&format!("cd {source} && ./configure --enable-optimizations"))?;
        steps.required(&format!("cd {source} && make altinstall"))?;
        Ok(())
    }
}
