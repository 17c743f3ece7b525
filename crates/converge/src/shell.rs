//! Shell command builders
//!
//! Every probe and mutation that touches a file or checks for a binary is
//! built here so the exact command shape is defined once. The simulated
//! host in [`crate::sim`] parses these same shapes back.

/// Characters that never need quoting in a POSIX shell word
fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '=' | '@' | '%' | '+' | ',' | '~')
}

/// Quote a single shell word
///
/// Safe words are returned unchanged; everything else is wrapped in single
/// quotes with embedded quotes written as `'\''`.
pub fn quote(word: &str) -> String {
    if !word.is_empty() && word.chars().all(is_safe) {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Split a command line into words, honouring quotes and backslashes
///
/// This is the inverse of [`quote`] and understands enough of POSIX word
/// splitting to read back the commands built in this module.
pub fn split(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '"' => {
                in_word = true;
                while let Some(q) = chars.next() {
                    match q {
                        '"' => break,
                        '\\' => match chars.next() {
                            Some(n @ ('"' | '\\' | '$' | '`')) => current.push(n),
                            Some(n) => {
                                current.push('\\');
                                current.push(n);
                            }
                            None => current.push('\\'),
                        },
                        _ => current.push(q),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(n) = chars.next() {
                    current.push(n);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            _ => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    words
}

/// `which <bin>` - succeeds when the binary is on PATH
pub fn which(bin: &str) -> String {
    format!("which {}", quote(bin))
}

pub fn test_file(path: &str) -> String {
    format!("test -f {}", quote(path))
}

pub fn test_dir(path: &str) -> String {
    format!("test -d {}", quote(path))
}

pub fn test_executable(path: &str) -> String {
    format!("test -x {}", quote(path))
}

/// Exists and is non-empty
pub fn test_nonempty(path: &str) -> String {
    format!("test -s {}", quote(path))
}

pub fn mkdir_p(path: &str) -> String {
    format!("mkdir -p {}", quote(path))
}

pub fn touch(path: &str) -> String {
    format!("touch {}", quote(path))
}

/// Exact whole-line containment check
pub fn contains_line(path: &str, line: &str) -> String {
    format!("grep -qxF -- {} {}", quote(line), quote(path))
}

/// Append lines to a file (run elevated to reach system files)
pub fn append_lines<S: AsRef<str>>(path: &str, lines: &[S]) -> String {
    format!("{} | tee -a {} >/dev/null", printf_lines(lines), quote(path))
}

/// Replace a file's content with the given lines
pub fn write_file<S: AsRef<str>>(path: &str, lines: &[S]) -> String {
    format!("{} | tee {} >/dev/null", printf_lines(lines), quote(path))
}

fn printf_lines<S: AsRef<str>>(lines: &[S]) -> String {
    let quoted: Vec<String> = lines.iter().map(|l| quote(l.as_ref())).collect();
    format!("printf '%s\\n' {}", quoted.join(" "))
}

/// Download `url` to `dest` (`-` for stdout) with a fixed retry count
pub fn wget(url: &str, dest: &str, tries: u32) -> String {
    format!("wget -O {} --tries {} {}", quote(dest), tries, quote(url))
}

pub fn apt_update() -> String {
    "apt-get update -yq".to_string()
}

pub fn apt_install<S: AsRef<str>>(packages: &[S]) -> String {
    let names: Vec<String> = packages.iter().map(|p| quote(p.as_ref())).collect();
    format!("apt-get install -yq {}", names.join(" "))
}

/// Succeeds when every package is installed
pub fn dpkg_installed<S: AsRef<str>>(packages: &[S]) -> String {
    let names: Vec<String> = packages.iter().map(|p| quote(p.as_ref())).collect();
    format!("dpkg -s {} >/dev/null 2>&1", names.join(" "))
}

/// Refresh the index and install in one hard-required step
pub fn apt_update_install<S: AsRef<str>>(packages: &[S]) -> String {
    format!("{} && {}", apt_update(), apt_install(packages))
}

/// Add an apt source list file with the given `deb` lines
pub fn apt_source<S: AsRef<str>>(list_name: &str, lines: &[S]) -> String {
    write_file(&format!("/etc/apt/sources.list.d/{list_name}.list"), lines)
}

/// Preseed one debconf answer
pub fn debconf_set(selection: &str) -> String {
    format!("echo {} | debconf-set-selections", quote(selection))
}

/// Prefix a command with the non-interactive debconf frontend
pub fn noninteractive(command: &str) -> String {
    format!("DEBIAN_FRONTEND=noninteractive {command}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_safe_words_unchanged() {
        assert_eq!(quote("/etc/sysctl.conf"), "/etc/sysctl.conf");
        assert_eq!(quote("~/.tmux.conf"), "~/.tmux.conf");
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn test_quote_spaces_and_quotes() {
        assert_eq!(quote("fs.file-max = 6553560"), "'fs.file-max = 6553560'");
        assert_eq!(quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_split_reads_back_quoted_words() {
        let line = "vm.overcommit_memory = 1";
        let cmd = contains_line("/etc/sysctl.conf", line);
        assert_eq!(
            split(&cmd),
            vec!["grep", "-qxF", "--", line, "/etc/sysctl.conf"]
        );

        let tricky = "echo 'hi' > /tmp/x";
        assert_eq!(split(&quote(tricky)), vec![tricky]);
    }

    #[test]
    fn test_split_double_quotes_and_escapes() {
        assert_eq!(
            split(r#"echo "a \"b\" c" d\ e"#),
            vec!["echo", r#"a "b" c"#, "d e"]
        );
    }

    #[test]
    fn test_append_lines_shape() {
        let cmd = append_lines("/etc/fstab", &["/swap1G none swap sw 0 0"]);
        assert_eq!(
            cmd,
            "printf '%s\\n' '/swap1G none swap sw 0 0' | tee -a /etc/fstab >/dev/null"
        );
        let words = split(&cmd);
        assert_eq!(words[0], "printf");
        assert_eq!(words[1], "%s\\n");
        assert_eq!(words[2], "/swap1G none swap sw 0 0");
        assert_eq!(&words[3..], &["|", "tee", "-a", "/etc/fstab", ">/dev/null"]);
    }

    #[test]
    fn test_debconf_and_dpkg() {
        assert_eq!(
            debconf_set("mysql-server mysql-server/root_password password root"),
            "echo 'mysql-server mysql-server/root_password password root' | debconf-set-selections"
        );
        assert_eq!(dpkg_installed(&["git", "jq"]), "dpkg -s git jq >/dev/null 2>&1");
    }

    #[test]
    fn test_apt_helpers() {
        assert_eq!(apt_install(&["redis-server"]), "apt-get install -yq redis-server");
        assert_eq!(
            apt_update_install(&["yarn"]),
            "apt-get update -yq && apt-get install -yq yarn"
        );
        assert_eq!(
            wget("https://dl.eff.org/certbot-auto", "/usr/bin/certbot-auto", 3),
            "wget -O /usr/bin/certbot-auto --tries 3 https://dl.eff.org/certbot-auto"
        );
    }
}
