use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};


#[derive(Clone, Debug, Eq, Hash, Ord, Parser, PartialEq, PartialOrd)]
pub struct Opts {
    #[command(flatten)]
    pub source: Source,

    #[arg(short = 'D', long, group = "auth")]
    pub bind_dn: Option<String>,

    #[arg(short = 'c', long, group = "auth")]
    pub credentials_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[group(multiple = false)]
pub struct Source {
    /// URL of the directory server.
    #[arg(short = 'H', long)]
    pub ldap_uri: Option<String>,

    /// Work on an in-memory directory loaded from this LDIF file instead.
    #[arg(long)]
    pub ldif: Option<PathBuf>,
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Subcommand)]
pub enum Command {
    /// Search and print the results as LDIF.
    Search(SearchOpts),

    /// Print one entry as LDIF.
    Read { dn: String },

    /// Print whether an entry exists.
    Exists { dn: String },

    /// Print whether an entry holds the given value.
    Compare {
        dn: String,

        /// The assertion, as `attribute=value`.
        assertion: String,
    },

    /// Create every entry in an LDIF file.
    Add { ldif_path: PathBuf },

    Delete { dn: String },

    /// Move an entry to a new RDN and superior.
    Rename {
        dn: String,
        new_rdn: String,
        new_superior: String,

        /// Keep the old RDN value as an attribute value.
        #[arg(long)]
        keep_old_rdn: bool,
    },

    Modify(ModifyOpts),
}

#[derive(Args, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SearchOpts {
    /// TOML file with the search parameters (base, scope, filter, filterArgs, attrs, timeLimit, countLimit).
    #[arg(long, conflicts_with_all = ["base", "scope", "filter_args", "filter", "attrs"])]
    pub config: Option<PathBuf>,

    #[arg(short = 'b', long)]
    pub base: Option<String>,

    /// BASE, ONE or SUB.
    #[arg(short = 's', long)]
    pub scope: Option<String>,

    /// Value for a `{n}` placeholder in the filter; repeat in order.
    #[arg(short = 'a', long = "arg")]
    pub filter_args: Vec<String>,

    pub filter: Option<String>,

    pub attrs: Vec<String>,
}

#[derive(Args, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ModifyOpts {
    pub dn: String,

    /// TOML file with `changes = [[kind, {attributes}], ...]`.
    #[arg(long, conflicts_with_all = ["add", "delete", "replace"])]
    pub changes: Option<PathBuf>,

    /// `attribute=value` to add; repeat for more values.
    #[arg(long)]
    pub add: Vec<String>,

    /// `attribute=value` to delete, or just `attribute` to delete all values.
    #[arg(long)]
    pub delete: Vec<String>,

    /// `attribute=value` to replace with; repeat for more values.
    #[arg(long)]
    pub replace: Vec<String>,
}
