mod args;


use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ldapfacade::{
    AttrValue, AttributeSet, Connector, Credentials, Error, Facade, LdapConnector, MemoryDirectory,
    Modification, ModificationKind, Record, Result, Scalar, SearchConfig, ServerConfig,
};
use ldapfacade::config::DEFAULT_URL;
use ldapfacade::ldif::{parse_ldif, write_entry, write_record};
use ldapfacade::search::{Literal, OneOrMany};

use crate::args::{Command, ModifyOpts, Opts, SearchOpts};


fn read_file(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::invalid(format!("failed to read {} {}: {}", what, path.display(), e)))
}

fn record_to_ldif(record: &Record) -> String {
    let mut ldif = String::new();
    // writing into a String cannot fail
    let _ = write_record(&mut ldif, record);
    ldif
}

fn split_assignment(assignment: &str) -> Result<(&str, &str)> {
    assignment.split_once('=')
        .filter(|(name, _)| name.len() > 0)
        .ok_or_else(|| Error::invalid(format!("expected attribute=value, got {:?}", assignment)))
}

/// Groups `attribute=value` arguments by attribute, keeping first-seen order.
/// With `allow_bare`, a lone `attribute` stands for all of its values.
fn attribute_set_from_assignments(assignments: &[String], allow_bare: bool) -> Result<AttributeSet> {
    let mut grouped: Vec<(String, Vec<Scalar>)> = Vec::new();
    for assignment in assignments {
        let (name, value) = if allow_bare && !assignment.contains('=') {
            (assignment.as_str(), None)
        } else {
            let (name, value) = split_assignment(assignment)?;
            (name, Some(Scalar::from(value)))
        };
        let index = match grouped.iter().position(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some(i) => i,
            None => {
                grouped.push((name.to_owned(), Vec::new()));
                grouped.len() - 1
            },
        };
        if let Some(value) = value {
            grouped[index].1.push(value);
        }
    }

    Ok(grouped.into_iter()
        .map(|(name, mut values)| {
            let value = if values.len() == 1 {
                AttrValue::Single(values.remove(0))
            } else {
                AttrValue::Multi(values)
            };
            (name, value)
        })
        .collect())
}

fn search_config(opts: SearchOpts) -> Result<SearchConfig> {
    if let Some(config_path) = &opts.config {
        return SearchConfig::from_toml_str(&read_file(config_path, "search parameters")?);
    }
    Ok(SearchConfig {
        base: opts.base,
        scope: opts.scope,
        filter: opts.filter,
        filter_args: if opts.filter_args.len() > 0 {
            Some(OneOrMany::Many(opts.filter_args.into_iter().map(Literal::Text).collect()))
        } else {
            None
        },
        attrs: if opts.attrs.len() > 0 {
            Some(OneOrMany::Many(opts.attrs))
        } else {
            None
        },
        ..SearchConfig::default()
    })
}

fn modifications(opts: &ModifyOpts) -> Result<Vec<Modification>> {
    if let Some(changes_path) = &opts.changes {
        let changes_string = read_file(changes_path, "changes file")?;
        let table: toml::Table = toml::from_str(&changes_string)
            .map_err(|e| Error::invalid(format!("failed to parse changes file {}: {}", changes_path.display(), e)))?;
        let changes = table.get("changes")
            .ok_or_else(|| Error::invalid(format!("changes file {} has no \"changes\" key", changes_path.display())))?;
        return Modification::list_from_toml(changes);
    }

    let mut modifications = Vec::new();
    let kinds = [
        (ModificationKind::Add, &opts.add, false),
        (ModificationKind::Delete, &opts.delete, true),
        (ModificationKind::Replace, &opts.replace, false),
    ];
    for (kind, assignments, allow_bare) in kinds {
        if assignments.len() > 0 {
            modifications.push(Modification::new(kind, attribute_set_from_assignments(assignments, allow_bare)?));
        }
    }
    if modifications.len() == 0 {
        return Err(Error::invalid("nothing to modify; pass --changes, --add, --delete or --replace"));
    }
    Ok(modifications)
}


async fn execute<C: Connector>(facade: &Facade<C>, command: Command) -> Result<()> {
    match command {
        Command::Search(opts) => {
            let spec = search_config(opts)?.into_spec()?;
            facade.each_entry(&spec, |record| print!("{}", record_to_ldif(&record))).await?;
        },
        Command::Read { dn } => {
            let entry = facade.read(&dn).await?;
            let mut ldif = String::new();
            let _ = write_entry(&mut ldif, &entry);
            print!("{}", ldif);
        },
        Command::Exists { dn } => {
            println!("{}", facade.exists(&dn).await?);
        },
        Command::Compare { dn, assertion } => {
            let (name, value) = split_assignment(&assertion)?;
            let assertion = AttributeSet::new().with(name, value);
            println!("{}", facade.compare(&dn, &assertion).await?);
        },
        Command::Add { ldif_path } => {
            let ldif = read_file(&ldif_path, "LDIF file")?;
            for record in parse_ldif(&ldif) {
                facade.add(&record.dn, &record.attributes).await?;
                info!(dn = %record.dn, "added entry");
            }
        },
        Command::Delete { dn } => {
            facade.delete(&dn).await?;
        },
        Command::Rename { dn, new_rdn, new_superior, keep_old_rdn } => {
            facade.modify_dn(&dn, &new_rdn, !keep_old_rdn, &new_superior).await?;
        },
        Command::Modify(opts) => {
            let modifications = modifications(&opts)?;
            facade.modify(&opts.dn, &modifications).await?;
        },
    }
    Ok(())
}

async fn run() -> Result<()> {
    let opts = Opts::parse();

    // obtain credentials
    let credentials = if let Some(bind_dn) = opts.bind_dn {
        let password = rpassword::prompt_password("LDAP password: ")
            .map_err(|e| Error::invalid(format!("failed to read LDAP password: {}", e)))?;
        Some(Credentials::new(bind_dn, password))
    } else if let Some(credentials_file) = opts.credentials_file {
        Some(Credentials::from_toml_file(&credentials_file)?)
    } else {
        None
    };

    if let Some(ldif_path) = opts.source.ldif {
        let directory = MemoryDirectory::from_ldif(&read_file(&ldif_path, "LDIF file")?)?;
        info!(path = %ldif_path.display(), entries = directory.len(), "loaded in-memory directory");
        let config = ServerConfig {
            url: format!("ldif:{}", ldif_path.display()),
            credentials,
        };
        execute(&Facade::with_connector(config, directory), opts.command).await
    } else {
        let config = ServerConfig {
            url: opts.source.ldap_uri.unwrap_or_else(|| DEFAULT_URL.to_owned()),
            credentials,
        };
        execute(&Facade::with_connector(config, LdapConnector), opts.command).await
    }
}


#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        },
    }
}
