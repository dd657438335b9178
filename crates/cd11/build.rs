/// Build metadata surfaced by `cd11 version --extended`.
const FORWARDED: &[(&str, &str)] = &[
    ("TARGET", "CD11_BUILD_TARGET"),
    ("PROFILE", "CD11_BUILD_PROFILE"),
];

fn main() {
    for (source, exported) in FORWARDED {
        if let Ok(value) = std::env::var(source) {
            println!("cargo:rustc-env={exported}={value}");
        }
        println!("cargo:rerun-if-env-changed={source}");
    }
    // Read through option_env! in version.rs; set by release tooling.
    println!("cargo:rerun-if-env-changed=GIT_HASH");
}
