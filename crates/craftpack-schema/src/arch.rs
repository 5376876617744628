//! Target architecture naming.

/// Debian-style name of the architecture this binary runs on.
pub fn host_architecture() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "arm" => "armhf",
        "powerpc64" => "ppc64el",
        "riscv64" => "riscv64",
        "s390x" => "s390x",
        "x86" => "i386",
        other => other,
    }
}

/// Resolve the architecture to build for.
///
/// `None` and `all` build for the host. A `-`-joined list (for example
/// `amd64-arm64`) resolves to its first entry that is not the host, falling
/// back to the host when every entry is the host.
pub fn resolve_build_for(build_for: Option<&str>, host: &str) -> String {
    let Some(build_for) = build_for.map(str::trim).filter(|b| !b.is_empty()) else {
        return host.to_owned();
    };
    if build_for == "all" {
        return host.to_owned();
    }
    build_for
        .split('-')
        .find(|arch| !arch.is_empty() && *arch != host)
        .unwrap_or(host)
        .to_owned()
}
