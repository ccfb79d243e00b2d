use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use common::title::is_excluded;
use fnv::FnvHashMap;
use log::{debug, info, warn};

/// Output file mapping every non-redirect title to its page id.
pub const TITLES_OUTPUT: &str = "titles_wid.tsv";
/// Output file mapping every resolved redirect to its canonical page id.
pub const REDIRECTS_OUTPUT: &str = "redirect_wid.tsv";

/// A redirect page pointing at another title, before resolution.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RedirectEdge {
    pub from_title: String,
    pub from_id: u64,
    pub to_title: String,
}

impl RedirectEdge {
    pub fn new<S: Into<String>, T: Into<String>>(from_title: S, from_id: u64, to_title: T) -> Self {
        RedirectEdge {
            from_title: from_title.into(),
            from_id,
            to_title: to_title.into(),
        }
    }
}

/// A redirect whose chain ends at a non-redirect page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedAlias {
    pub from_title: String,
    pub from_id: u64,
    pub canonical_id: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ResolveStats {
    pub rounds: usize,
    /// Edges resolved, directly or through another alias.
    pub resolved: usize,
    /// Edges resolved through another alias.
    pub nested: usize,
    /// Edges left unresolved.
    pub broken: usize,
    /// Unresolved edges whose target is in an excluded namespace.
    pub broken_excluded: usize,
}

/// Titles and resolved aliases, the lookup tables for anchor aggregation.
#[derive(Clone, Debug, Default)]
pub struct Resolution {
    pub titles: FnvHashMap<String, u64>,
    pub aliases: FnvHashMap<String, ResolvedAlias>,
    pub broken: Vec<RedirectEdge>,
    pub stats: ResolveStats,
}

impl Resolution {
    /// Canonical page id for a normalized title. Page titles win over aliases.
    pub fn lookup(&self, title: &str) -> Option<u64> {
        self.titles
            .get(title)
            .cloned()
            .or_else(|| self.aliases.get(title).map(|alias| alias.canonical_id))
    }

    /// Write `title\tid` lines sorted by title.
    pub fn write_titles<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let mut titles = self.titles.iter().collect::<Vec<_>>();
        titles.sort();
        for (title, id) in titles {
            writeln!(writer, "{}\t{}", title, id)?;
        }
        Ok(())
    }

    /// Write `alias\talias_id\tcanonical_id` lines sorted by alias title.
    pub fn write_aliases<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let mut aliases = self.aliases.values().collect::<Vec<_>>();
        aliases.sort_by(|a, b| a.from_title.cmp(&b.from_title));
        for alias in aliases {
            writeln!(
                writer,
                "{}\t{}\t{}",
                alias.from_title, alias.from_id, alias.canonical_id
            )?;
        }
        Ok(())
    }

    /// Write both output tables into `dir`.
    pub fn write_to_dir<P: AsRef<Path>>(&self, dir: P) -> io::Result<()> {
        let dir = dir.as_ref();
        let mut titles = BufWriter::new(File::create(dir.join(TITLES_OUTPUT))?);
        self.write_titles(&mut titles)?;
        titles.flush()?;
        let mut aliases = BufWriter::new(File::create(dir.join(REDIRECTS_OUTPUT))?);
        self.write_aliases(&mut aliases)?;
        aliases.flush()?;
        info!(
            "Wrote {} titles and {} aliases to {:?}",
            self.titles.len(),
            self.aliases.len(),
            dir
        );
        Ok(())
    }
}

/// Resolve redirect edges against the title map until a round makes no
/// progress.
///
/// Each round resolves every pending edge whose target is either a page
/// title or an alias resolved earlier, inheriting that alias's canonical id.
/// Chains of any length resolve; cycles and dangling targets are left
/// broken.
pub fn resolve_redirects<S: AsRef<str>>(
    titles: FnvHashMap<String, u64>,
    edges: Vec<RedirectEdge>,
    excluded: &[S],
) -> Resolution {
    let mut aliases: FnvHashMap<String, ResolvedAlias> = FnvHashMap::default();
    let mut stats = ResolveStats::default();
    let mut pending = edges;

    while !pending.is_empty() {
        stats.rounds += 1;
        let before = pending.len();
        let mut unresolved = Vec::with_capacity(before);
        for edge in pending {
            let canonical = match titles.get(&edge.to_title) {
                Some(&id) => Some(id),
                None => aliases.get(&edge.to_title).map(|alias| {
                    stats.nested += 1;
                    alias.canonical_id
                }),
            };
            match canonical {
                Some(canonical_id) => {
                    stats.resolved += 1;
                    let alias = ResolvedAlias {
                        from_title: edge.from_title,
                        from_id: edge.from_id,
                        canonical_id,
                    };
                    if let Some(previous) = aliases.insert(alias.from_title.clone(), alias) {
                        debug!("Duplicate alias {}", previous.from_title);
                    }
                }
                None => unresolved.push(edge),
            }
        }
        debug!(
            "Redirect round {}: {} resolved, {} pending",
            stats.rounds,
            before - unresolved.len(),
            unresolved.len()
        );
        let progress = unresolved.len() < before;
        pending = unresolved;
        if !progress {
            break;
        }
    }

    pending.sort();
    for edge in &pending {
        stats.broken += 1;
        if is_excluded(&edge.to_title, excluded) {
            stats.broken_excluded += 1;
        } else {
            warn!(
                "Broken redirect: {} ({}) -> {}",
                edge.from_title, edge.from_id, edge.to_title
            );
        }
    }
    info!(
        "Resolved {} redirects ({} nested) in {} rounds, {} broken ({} excluded)",
        stats.resolved, stats.nested, stats.rounds, stats.broken, stats.broken_excluded
    );

    Resolution {
        titles,
        aliases,
        broken: pending,
        stats,
    }
}
