//! Signature side-log
//!
//! A method can opt into a per-type text report of its rendered
//! signatures. The report is best-effort: IO failures are logged and never
//! block processing.

use std::fmt::Write as _;
use std::fs;

use weft_model::world::TypeEnv;
use weft_model::{DetailFlags, MethodSite, Module, World};

use crate::options::Options;

/// Write one report file per type containing opted-in methods, under
/// `<log_dir>/<module>/<type>.txt`.
pub fn write_reports(module: &Module, world: &World, options: &Options) {
    let env = TypeEnv::new(module, world);

    for ty in &module.types {
        let mut report = String::new();
        for method in &ty.methods {
            if method.signature_logs.is_empty() {
                continue;
            }

            let site = MethodSite::new(module, ty, method);
            let _ = writeln!(report, "{}", weft_render::render(&env, site, DetailFlags::ALL));
            for mask in &method.signature_logs {
                let _ = writeln!(
                    report,
                    "-> {:?}:{}",
                    mask,
                    weft_render::render(&env, site, *mask)
                );
            }
            report.push('\n');
        }

        if report.is_empty() {
            continue;
        }

        let dir = options.log_dir.join(&module.name);
        if let Err(e) = fs::create_dir_all(&dir) {
            log::warn!("signature report directory {} failed: {e}", dir.display());
            continue;
        }

        let file = dir.join(format!("{}.txt", sanitize(&ty.name.to_string())));
        if let Err(e) = fs::write(&file, &report) {
            log::warn!("signature report {} failed: {e}", file.display());
        }
    }
}

/// Replace characters that are unsafe in file names.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
