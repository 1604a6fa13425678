//! Text serialization of local-tree sequences (`.smc`, optionally gzipped).
//!
//! ```text
//! NAMES   <leaf 0 name> <leaf 1 name> ...
//! REGION  <chrom> <start+1> <end>
//! TREE    <start+1> <end> <newick>
//! SPR     <pos> <recomb_node> <recomb_time> <coal_node> <coal_time>
//! TREE    ...
//! ```
//!
//! Fields are tab-separated, SPR times are in generations and newick labels
//! are node indices annotated with `[&&NHX:age=<generations>]`.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use arg_core::{ArgError, Coord, ErrorInfo};
use arg_model::TimeModel;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::spr::{find_spr, link_trees, same_tree, Spr};
use crate::tree::LocalTree;
use crate::trees::{LocalTreeSpr, LocalTrees};

fn is_gzip(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("gz")
}

/// Renders `tree` as newick with node labels and ages.
pub fn write_newick(tree: &LocalTree, times: &[f64]) -> String {
    let mut out = String::new();
    newick_node(tree, tree.root(), times, &mut out);
    out.push(';');
    out
}

fn newick_node(tree: &LocalTree, node: usize, times: &[f64], out: &mut String) {
    if let Some([a, b]) = tree.children(node) {
        out.push('(');
        newick_node(tree, a, times, out);
        out.push(',');
        newick_node(tree, b, times, out);
        out.push(')');
    }
    let _ = write!(
        out,
        "{node}:{}[&&NHX:age={}]",
        tree.branch_length(node, times),
        times[tree.age(node)]
    );
}

/// Renders the whole sequence. `seq_names` is indexed by sequence id.
pub fn write_local_trees(
    trees: &LocalTrees,
    seq_names: &[String],
    times: &[f64],
) -> Result<String, ArgError> {
    let mut names = Vec::with_capacity(trees.nleaves());
    for &seqid in trees.seqids() {
        let name = seq_names.get(seqid).ok_or_else(|| {
            ArgError::Config(
                ErrorInfo::new("smc-names", "leaf refers to an unknown sequence")
                    .with_context("seqid", seqid.to_string()),
            )
        })?;
        names.push(name.as_str());
    }
    let mut out = String::new();
    let _ = writeln!(out, "NAMES\t{}", names.join("\t"));
    let _ = writeln!(out, "REGION\t{}\t{}\t{}", trees.chrom, trees.start() + 1, trees.end());
    for block in trees.blocks() {
        if let Some(spr) = &block.spr {
            let _ = writeln!(
                out,
                "SPR\t{}\t{}\t{}\t{}\t{}",
                block.start,
                spr.recomb_node,
                times[spr.recomb_time],
                spr.coal_node,
                times[spr.coal_time]
            );
        }
        let _ = writeln!(
            out,
            "TREE\t{}\t{}\t{}",
            block.start + 1,
            block.end,
            write_newick(&block.tree, times)
        );
    }
    Ok(out)
}

struct NewickParser<'a> {
    text: &'a [u8],
    pos: usize,
    parents: Vec<Option<usize>>,
    ages: Vec<f64>,
}

impl NewickParser<'_> {
    fn fail(&self, message: &str) -> ArgError {
        ArgError::Serde(
            ErrorInfo::new("newick-parse", message.to_string())
                .with_context("offset", self.pos.to_string()),
        )
    }

    fn peek(&self) -> Option<u8> {
        self.text.get(self.pos).copied()
    }

    fn take_while(&mut self, keep: impl Fn(u8) -> bool) -> &str {
        let begin = self.pos;
        while self.peek().is_some_and(&keep) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.text[begin..self.pos]).unwrap_or_default()
    }

    fn node(&mut self) -> Result<usize, ArgError> {
        let mut children = Vec::new();
        if self.peek() == Some(b'(') {
            self.pos += 1;
            loop {
                children.push(self.node()?);
                match self.peek() {
                    Some(b',') => self.pos += 1,
                    Some(b')') => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(self.fail("expected ',' or ')'")),
                }
            }
        }
        let label: usize = self
            .take_while(|c| c.is_ascii_digit())
            .parse()
            .map_err(|_| self.fail("node label must be an index"))?;
        if self.peek() == Some(b':') {
            self.pos += 1;
            self.take_while(|c| !matches!(c, b'[' | b',' | b')' | b';'));
        }
        let mut age = None;
        if self.peek() == Some(b'[') {
            let comment = self.take_while(|c| c != b']').to_string();
            self.pos += 1;
            age = comment
                .split(':')
                .flat_map(|field| field.split(','))
                .find_map(|kv| kv.strip_prefix("age="))
                .and_then(|v| v.parse::<f64>().ok());
        }
        let age = age.ok_or_else(|| self.fail("node lacks an NHX age"))?;
        if label >= self.parents.len() {
            self.parents.resize(label + 1, None);
            self.ages.resize(label + 1, f64::NAN);
        }
        if !self.ages[label].is_nan() {
            return Err(self.fail("duplicate node label"));
        }
        self.ages[label] = age;
        for child in children {
            self.parents[child] = Some(label);
        }
        Ok(label)
    }
}

/// Parses one newick tree written by [`write_newick`].
pub fn read_newick(text: &str, time: &TimeModel) -> Result<LocalTree, ArgError> {
    let mut parser = NewickParser {
        text: text.trim().as_bytes(),
        pos: 0,
        parents: Vec::new(),
        ages: Vec::new(),
    };
    parser.node()?;
    if parser.peek() != Some(b';') {
        return Err(parser.fail("expected ';'"));
    }
    let ages = parser
        .ages
        .iter()
        .enumerate()
        .map(|(node, &age)| {
            time.index_of(age).ok_or_else(|| {
                ArgError::Serde(
                    ErrorInfo::new("newick-age", "node age is not on the time grid")
                        .with_context("node", node.to_string())
                        .with_context("age", age.to_string()),
                )
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    LocalTree::from_parents(&parser.parents, &ages)
}

fn smc_error(code: &str, message: &str, lineno: usize) -> ArgError {
    ArgError::Serde(ErrorInfo::new(code, message).with_context("line", lineno.to_string()))
}

fn parse_field<T: std::str::FromStr>(field: Option<&str>, lineno: usize) -> Result<T, ArgError> {
    field
        .and_then(|f| f.trim().parse().ok())
        .ok_or_else(|| smc_error("smc-field", "malformed field", lineno))
}

fn time_index(time: &TimeModel, generations: f64, lineno: usize) -> Result<usize, ArgError> {
    time.index_of(generations)
        .ok_or_else(|| smc_error("smc-time", "time is not on the time grid", lineno))
}

/// Parses `.smc` text, returning the sequence and the leaf names.
///
/// Leaf `i` gets sequence id `i`; map them onto an alignment with
/// [`LocalTrees::map_seqids`].
pub fn read_local_trees(
    reader: impl BufRead,
    time: &TimeModel,
) -> Result<(LocalTrees, Vec<String>), ArgError> {
    let ntimes = time.ntimes();
    let mut names: Vec<String> = Vec::new();
    let mut region: Option<(String, Coord, Coord)> = None;
    let mut blocks: Vec<LocalTreeSpr> = Vec::new();
    let mut pending: Option<Spr> = None;

    for (idx, line) in reader.lines().enumerate() {
        let lineno = idx + 1;
        let line = line.map_err(|err| smc_error("smc-read", &err.to_string(), lineno))?;
        let mut fields = line.split('\t');
        match fields.next() {
            Some("NAMES") => names = fields.map(str::to_string).collect(),
            Some("REGION") => {
                let chrom = fields
                    .next()
                    .ok_or_else(|| smc_error("smc-region", "REGION lacks a chromosome", lineno))?;
                let start: Coord = parse_field(fields.next(), lineno)?;
                let end: Coord = parse_field(fields.next(), lineno)?;
                if start == 0 || end < start {
                    return Err(smc_error("smc-region", "bad REGION coordinates", lineno));
                }
                region = Some((chrom.to_string(), start - 1, end));
            }
            Some("SPR") => {
                let _pos: Coord = parse_field(fields.next(), lineno)?;
                let recomb_node = parse_field(fields.next(), lineno)?;
                let recomb_time = time_index(time, parse_field(fields.next(), lineno)?, lineno)?;
                let coal_node = parse_field(fields.next(), lineno)?;
                let coal_time = time_index(time, parse_field(fields.next(), lineno)?, lineno)?;
                pending = Some(Spr {
                    recomb_node,
                    recomb_time,
                    coal_node,
                    coal_time,
                });
            }
            Some("TREE") => {
                let start: Coord = parse_field(fields.next(), lineno)?;
                let end: Coord = parse_field(fields.next(), lineno)?;
                let newick = fields
                    .next()
                    .ok_or_else(|| smc_error("smc-tree", "TREE lacks a newick string", lineno))?;
                if start == 0 || end < start {
                    return Err(smc_error("smc-tree", "bad TREE coordinates", lineno));
                }
                let tree = read_newick(newick, time).map_err(|err| {
                    let mut info = err.info().clone();
                    info.context.insert("line".into(), lineno.to_string());
                    ArgError::Serde(info)
                })?;
                let spr = pending.take();
                match blocks.last_mut() {
                    None => blocks.push(LocalTreeSpr {
                        start: start - 1,
                        end,
                        tree,
                        spr: None,
                        mapping: None,
                    }),
                    Some(prev) if same_tree(&prev.tree, &tree) => prev.end = end,
                    Some(prev) => {
                        let linked = spr
                            .and_then(|spr| {
                                link_trees(&prev.tree, &spr, &tree, ntimes).map(|m| (spr, m))
                            })
                            .or_else(|| find_spr(&prev.tree, &tree, ntimes))
                            .ok_or_else(|| {
                                smc_error("smc-link", "trees are not one SPR apart", lineno)
                            })?;
                        blocks.push(LocalTreeSpr {
                            start: start - 1,
                            end,
                            tree,
                            spr: Some(linked.0),
                            mapping: Some(linked.1),
                        });
                    }
                }
            }
            Some("") | None => {}
            Some(other) => {
                return Err(ArgError::Serde(
                    ErrorInfo::new("smc-line", "unknown line type")
                        .with_context("line", lineno.to_string())
                        .with_context("kind", other.to_string()),
                ))
            }
        }
    }

    let (chrom, start, end) =
        region.ok_or_else(|| smc_error("smc-region", "missing REGION line", 0))?;
    let seqids = (0..names.len()).collect();
    let trees = LocalTrees::from_blocks(chrom, start, end, seqids, blocks)?;
    trees.validate(ntimes)?;
    Ok((trees, names))
}

/// Writes the sequence to `path`; a `.gz` suffix selects gzip.
pub fn store_arg(
    path: &Path,
    trees: &LocalTrees,
    seq_names: &[String],
    times: &[f64],
) -> Result<(), ArgError> {
    let text = write_local_trees(trees, seq_names, times)?;
    let file = File::create(path).map_err(|err| ArgError::io("smc-create", err, path))?;
    let result = if is_gzip(path) {
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        encoder
            .write_all(text.as_bytes())
            .and_then(|_| encoder.finish())
            .and_then(|mut inner| inner.flush())
    } else {
        let mut writer = BufWriter::new(file);
        writer.write_all(text.as_bytes()).and_then(|_| writer.flush())
    };
    result.map_err(|err| ArgError::io("smc-write", err, path))?;
    debug!(path = %path.display(), blocks = trees.len(), "stored ARG");
    Ok(())
}

/// Reads a sequence written by [`store_arg`].
pub fn load_arg(path: &Path, time: &TimeModel) -> Result<(LocalTrees, Vec<String>), ArgError> {
    let file = File::open(path).map_err(|err| ArgError::io("smc-open", err, path))?;
    let reader: Box<dyn Read> = if is_gzip(path) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    read_local_trees(BufReader::new(reader), time).map_err(|err| {
        let mut info = err.info().clone();
        info.context.insert("path".into(), path.display().to_string());
        match err {
            ArgError::Structure(_) => ArgError::Structure(info),
            _ => ArgError::Serde(info),
        }
    })
}
