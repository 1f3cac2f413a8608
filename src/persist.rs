//! Plain-text files each role reads or writes across restarts.
//!
//! * key file: `d`, `n`, `p`, `q`, one decimal per line
//! * eligible identities: a count followed by that many decimal identities
//! * credential: `pseudonym`, `k`, then `k` lines `a c d r`, the tuples opened
//!   during registration first and the retained tuples after

use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::str::{FromStr, SplitWhitespace};

use num_bigint::BigUint;

use crate::error::{check_security_constant, Error, Result};
use crate::registration::{registration_challenge_size, Credential, SecretTuple};
use crate::rsa::KeyMaterial;

struct Tokens<'a> {
    what: &'static str,
    inner: SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn new(what: &'static str, text: &'a str) -> Self {
        Tokens {
            what,
            inner: text.split_whitespace(),
        }
    }

    fn field<T: FromStr>(&mut self, field: &str) -> Result<T>
    where
        T::Err: ToString,
    {
        let token = self
            .inner
            .next()
            .ok_or_else(|| Error::parse(self.what, format!("missing {}", field)))?;
        token
            .parse()
            .map_err(|e: T::Err| Error::parse(self.what, format!("{} {:?}: {}", field, token, e.to_string())))
    }

    fn tuple(&mut self) -> Result<SecretTuple> {
        Ok(SecretTuple {
            a: self.field("a")?,
            c: self.field("c")?,
            d: self.field("d")?,
            r: self.field("r")?,
        })
    }
}

pub fn parse_keys(text: &str) -> Result<KeyMaterial> {
    let mut tokens = Tokens::new("key file", text);
    let d = tokens.field("d")?;
    let n = tokens.field("n")?;
    let p = tokens.field("p")?;
    let q = tokens.field("q")?;
    KeyMaterial::from_parts(d, n, p, q)
}

pub fn render_keys(keys: &KeyMaterial) -> String {
    format!("{}\n{}\n{}\n{}\n", keys.d, keys.n, keys.p, keys.q)
}

pub fn load_keys<P: AsRef<Path>>(path: P) -> Result<KeyMaterial> {
    parse_keys(&fs::read_to_string(path)?)
}

pub fn save_keys<P: AsRef<Path>>(path: P, keys: &KeyMaterial) -> Result<()> {
    fs::write(path, render_keys(keys))?;
    Ok(())
}

pub fn parse_eligible_ids(text: &str) -> Result<HashSet<BigUint>> {
    let mut tokens = Tokens::new("identity list", text);
    let count: usize = tokens.field("count")?;
    (0..count).map(|_| tokens.field("identity")).collect()
}

pub fn load_eligible_ids<P: AsRef<Path>>(path: P) -> Result<HashSet<BigUint>> {
    parse_eligible_ids(&fs::read_to_string(path)?)
}

pub fn parse_credential(text: &str) -> Result<Credential> {
    let mut tokens = Tokens::new("credential", text);
    let pseudonym = tokens.field("pseudonym")?;
    let k = check_security_constant(tokens.field("k")?)?;
    let opened = registration_challenge_size(k);

    let disclosed = (0..opened)
        .map(|_| tokens.tuple())
        .collect::<Result<Vec<_>>>()?;
    let retained = (opened..k)
        .map(|_| tokens.tuple())
        .collect::<Result<Vec<_>>>()?;

    Ok(Credential {
        pseudonym,
        disclosed,
        retained,
    })
}

pub fn render_credential(credential: &Credential) -> String {
    let mut out = format!(
        "{}\n{}\n",
        credential.pseudonym,
        credential.security_constant()
    );
    for tuple in credential.disclosed.iter().chain(&credential.retained) {
        // writing to a String cannot fail
        let _ = writeln!(out, "{} {} {} {}", tuple.a, tuple.c, tuple.d, tuple.r);
    }
    out
}

pub fn load_credential<P: AsRef<Path>>(path: P) -> Result<Credential> {
    parse_credential(&fs::read_to_string(path)?)
}

pub fn save_credential<P: AsRef<Path>>(path: P, credential: &Credential) -> Result<()> {
    fs::write(path, render_credential(credential))?;
    Ok(())
}
