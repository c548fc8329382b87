use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use regex::{Regex, RegexBuilder};

use crate::{Error, Result, error::capture};

/// A dynamically typed value, the currency of assertions and events.
///
/// Primitives (`Undefined`, `Null`, `Bool`, `Number`, `Text`) compare by value
/// under [`Value::strict_eq`]. Every other variant is a shared reference and
/// compares by identity, so cloning a `Value::Sequence` yields a second handle
/// to the same sequence, not a copy. Composite values may contain themselves.
///
/// `PartialEq` is strict equality: `NaN != NaN`, `0 == -0`.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Text(Rc<str>),
    /// A primitive wrapped in an object, e.g. `new String("a")`.
    Boxed(Rc<Value>),
    Date(Rc<Temporal>),
    Pattern(Rc<Pattern>),
    Callable(Callable),
    Sequence(Sequence),
    Map(Map),
}

impl Value {
    pub fn text(s: impl Into<Rc<str>>) -> Self {
        Value::Text(s.into())
    }

    /// Wrap a primitive. Boxing a reference value returns it unchanged.
    pub fn boxed(value: impl Into<Value>) -> Self {
        let value = value.into();
        if value.is_object() {
            value
        } else {
            Value::Boxed(Rc::new(value))
        }
    }

    pub fn date(temporal: Temporal) -> Self {
        Value::Date(Rc::new(temporal))
    }

    pub fn pattern(source: &str, flags: &str) -> Result<Self> {
        Ok(Value::Pattern(Rc::new(Pattern::new(source, flags)?)))
    }

    pub fn function(f: impl Fn(&[Value]) -> Result<Value> + 'static) -> Self {
        Value::Callable(Callable::new(f))
    }

    pub fn sequence<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::Sequence(Sequence::from_values(items))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// True for every variant that is held by reference.
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            Value::Boxed(_)
                | Value::Date(_)
                | Value::Pattern(_)
                | Value::Callable(_)
                | Value::Sequence(_)
                | Value::Map(_)
        )
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Sequence> {
        match self {
            Value::Sequence(seq) => Some(seq),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Identity comparison (`===`).
    pub fn strict_eq(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Undefined, Undefined) | (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Number(a), Number(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (Boxed(a), Boxed(b)) => Rc::ptr_eq(a, b),
            (Date(a), Date(b)) => Rc::ptr_eq(a, b),
            (Pattern(a), Pattern(b)) => Rc::ptr_eq(a, b),
            (Callable(a), Callable(b)) => a.ptr_eq(b),
            (Sequence(a), Sequence(b)) => a.ptr_eq(b),
            (Map(a), Map(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Coercive comparison (`==`).
    pub fn loose_eq(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Undefined | Null, Undefined | Null) => true,
            (Undefined | Null, _) | (_, Undefined | Null) => false,
            (Number(a), Number(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (Bool(a), Bool(b)) => a == b,
            (Number(a), Text(_)) => *a == other.to_number(),
            (Text(_), Number(b)) => self.to_number() == *b,
            (Bool(_), _) => Number(self.to_number()).loose_eq(other),
            (_, Bool(_)) => self.loose_eq(&Number(other.to_number())),
            _ if self.is_object() && other.is_object() => self.strict_eq(other),
            _ if self.is_object() => self.to_primitive().loose_eq(other),
            _ => self.loose_eq(&other.to_primitive()),
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::Text(s) => parse_number(s),
            Value::Date(t) => t.millis().map_or(f64::NAN, |ms| ms as f64),
            other => other.to_primitive().to_number(),
        }
    }

    fn to_primitive(&self) -> Value {
        match self {
            Value::Boxed(inner) => (**inner).clone(),
            v if v.is_object() => Value::text(v.to_string()),
            v => v.clone(),
        }
    }

    /// Identity of a container that can participate in a cycle.
    pub(crate) fn address(&self) -> Option<usize> {
        match self {
            Value::Sequence(seq) => Some(seq.address()),
            Value::Map(map) => Some(map.address()),
            _ => None,
        }
    }

    fn display_with(&self, f: &mut fmt::Formatter<'_>, seen: &mut Vec<usize>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Text(s) => f.write_str(s),
            Value::Boxed(inner) => inner.display_with(f, seen),
            Value::Date(t) => write!(f, "{t}"),
            Value::Pattern(p) => write!(f, "{p}"),
            Value::Callable(_) => f.write_str("function () { [native code] }"),
            Value::Sequence(seq) => {
                let address = seq.address();
                if seen.contains(&address) {
                    return Ok(());
                }
                seen.push(address);
                for (i, slot) in seq.0.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    match slot {
                        None | Some(Value::Undefined | Value::Null) => {}
                        Some(v) => v.display_with(f, seen)?,
                    }
                }
                seen.pop();
                Ok(())
            }
            Value::Map(_) => f.write_str("[object Object]"),
        }
    }

    fn debug_with(&self, f: &mut fmt::Formatter<'_>, seen: &mut Vec<usize>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Boxed(inner) => {
                f.write_str("Boxed(")?;
                inner.debug_with(f, seen)?;
                f.write_str(")")
            }
            Value::Date(t) => write!(f, "Date({t})"),
            Value::Callable(_) => f.write_str("[Function]"),
            Value::Sequence(seq) => {
                let address = seq.address();
                if seen.contains(&address) {
                    return f.write_str("[Circular]");
                }
                seen.push(address);
                f.write_str("[")?;
                for (i, slot) in seq.0.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match slot {
                        Some(v) => v.debug_with(f, seen)?,
                        None => f.write_str("<hole>")?,
                    }
                }
                seen.pop();
                f.write_str("]")
            }
            Value::Map(map) => {
                let address = map.address();
                if seen.contains(&address) {
                    return f.write_str("[Circular]");
                }
                seen.push(address);
                f.write_str("{")?;
                for (i, (key, v)) in map.0.borrow().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: ")?;
                    v.debug_with(f, seen)?;
                }
                seen.pop();
                f.write_str("}")
            }
            other => other.display_with(f, seen),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.display_with(f, &mut Vec::new())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.debug_with(f, &mut Vec::new())
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        String::from(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n == 0.0 {
        "0".into()
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        let s = format!("{n:e}");
        match s.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => s,
        }
    } else {
        format!("{n}")
    }
}

fn parse_number(s: &str) -> f64 {
    let t = s.trim();
    match t {
        "" => return 0.0,
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return u64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    let numeric = t
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if numeric {
        t.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// A point in time, or an invalid date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Temporal(Option<DateTime<Utc>>);

impl Temporal {
    pub fn now() -> Self {
        Temporal(Some(Utc::now()))
    }

    pub fn invalid() -> Self {
        Temporal(None)
    }

    /// Milliseconds since the Unix epoch. Non-finite input yields an invalid date.
    pub fn from_millis(ms: f64) -> Self {
        if !ms.is_finite() {
            return Self::invalid();
        }
        Temporal(DateTime::from_timestamp_millis(ms.trunc() as i64))
    }

    /// Midnight UTC of the given calendar day (`month` is 1-based).
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Self {
        Temporal(
            NaiveDate::from_ymd_opt(year, month, day)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc()),
        )
    }

    /// Parses RFC 3339 timestamps and bare `YYYY-MM-DD` dates.
    pub fn parse(s: &str) -> Self {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Temporal(Some(dt.with_timezone(&Utc)));
        }
        match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            Ok(date) => Temporal(date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())),
            Err(_) => Self::invalid(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    pub fn millis(&self) -> Option<i64> {
        self.0.map(|dt| dt.timestamp_millis())
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        self.0
    }
}

impl fmt::Display for Temporal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(dt) => f.write_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => f.write_str("Invalid Date"),
        }
    }
}

/// A regular expression with `g`, `i` and `m` flags.
///
/// Global patterns are stateful: [`Pattern::test`] resumes from
/// [`Pattern::last_index`] and advances it past each match.
#[derive(Debug)]
pub struct Pattern {
    source: String,
    global: bool,
    ignore_case: bool,
    multiline: bool,
    regex: Regex,
    last_index: Cell<usize>,
}

impl Pattern {
    pub fn new(source: &str, flags: &str) -> Result<Self> {
        let (mut global, mut ignore_case, mut multiline) = (false, false, false);
        for flag in flags.chars() {
            let slot = match flag {
                'g' => &mut global,
                'i' => &mut ignore_case,
                'm' => &mut multiline,
                _ => return Err(invalid_flags(flags)),
            };
            if *slot {
                return Err(invalid_flags(flags));
            }
            *slot = true;
        }
        let regex = RegexBuilder::new(source)
            .case_insensitive(ignore_case)
            .multi_line(multiline)
            .build()?;
        Ok(Self {
            source: source.to_string(),
            global,
            ignore_case,
            multiline,
            regex,
            last_index: Cell::new(0),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn global(&self) -> bool {
        self.global
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    pub fn multiline(&self) -> bool {
        self.multiline
    }

    pub fn flags(&self) -> String {
        [(self.global, 'g'), (self.ignore_case, 'i'), (self.multiline, 'm')]
            .into_iter()
            .filter_map(|(on, c)| on.then_some(c))
            .collect()
    }

    pub fn last_index(&self) -> usize {
        self.last_index.get()
    }

    pub fn set_last_index(&self, index: usize) {
        self.last_index.set(index);
    }

    pub fn test(&self, haystack: &str) -> bool {
        if !self.global {
            return self.regex.is_match(haystack);
        }
        let start = self.last_index.get();
        let found = (start <= haystack.len() && haystack.is_char_boundary(start))
            .then(|| self.regex.find_at(haystack, start))
            .flatten();
        match found {
            Some(m) => {
                self.last_index.set(m.end());
                true
            }
            None => {
                self.last_index.set(0);
                false
            }
        }
    }
}

fn invalid_flags(flags: &str) -> Error {
    Error::named(
        "SyntaxError",
        format!("Invalid flags supplied to RegExp constructor '{flags}'"),
    )
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags())
    }
}

/// A function value. Two callables are equal only if they are the same function.
#[derive(Clone)]
pub struct Callable(Rc<dyn Fn(&[Value]) -> Result<Value>>);

impl Callable {
    pub fn new(f: impl Fn(&[Value]) -> Result<Value> + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        capture(|| (self.0)(args))
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[Function]")
    }
}

/// A shared, growable, possibly sparse sequence. `None` slots are holes.
#[derive(Clone, Default)]
pub struct Sequence(Rc<RefCell<Vec<Option<Value>>>>);

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sequence of `len` holes.
    pub fn with_len(len: usize) -> Self {
        Self(Rc::new(RefCell::new(vec![None; len])))
    }

    pub fn from_values<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self(Rc::new(RefCell::new(
            items.into_iter().map(|v| Some(v.into())).collect(),
        )))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.0.borrow_mut().push(Some(value.into()));
    }

    /// Store at `index`, growing the sequence with holes as needed.
    pub fn set(&self, index: usize, value: impl Into<Value>) {
        let mut slots = self.0.borrow_mut();
        if index >= slots.len() {
            slots.resize(index + 1, None);
        }
        slots[index] = Some(value.into());
    }

    /// The value at `index`; `None` for holes and out-of-range indices.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned().flatten()
    }

    /// Whether `index` holds a value (possibly `Undefined`) rather than a hole.
    pub fn has(&self, index: usize) -> bool {
        matches!(self.0.borrow().get(index), Some(Some(_)))
    }

    /// Punch a hole at `index` without changing the length.
    pub fn delete(&self, index: usize) {
        if let Some(slot) = self.0.borrow_mut().get_mut(index) {
            *slot = None;
        }
    }

    pub fn ptr_eq(&self, other: &Sequence) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn address(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn slots(&self) -> std::cell::Ref<'_, Vec<Option<Value>>> {
        self.0.borrow()
    }
}

/// A shared map of own string keys, kept in insertion order.
#[derive(Clone, Default)]
pub struct Map(Rc<RefCell<Vec<(String, Value)>>>);

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let map = Self::new();
        for (key, value) in entries {
            map.insert(key, value);
        }
        map
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace; replacing keeps the key's original position.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        let mut entries = self.0.borrow_mut();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().iter().any(|(k, _)| k == key)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut entries = self.0.borrow_mut();
        let index = entries.iter().position(|(k, _)| k == key)?;
        Some(entries.remove(index).1)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn ptr_eq(&self, other: &Map) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn address(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub(crate) fn entries(&self) -> std::cell::Ref<'_, Vec<(String, Value)>> {
        self.0.borrow()
    }
}

macro_rules! from_number {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Number(n as f64)
            }
        })*
    };
}

from_number!(f64, f32, i32, i64, u32, u64, usize);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::text(s)
    }
}

impl From<Temporal> for Value {
    fn from(t: Temporal) -> Self {
        Value::date(t)
    }
}

impl From<Pattern> for Value {
    fn from(p: Pattern) -> Self {
        Value::Pattern(Rc::new(p))
    }
}

impl From<Callable> for Value {
    fn from(c: Callable) -> Self {
        Value::Callable(c)
    }
}

impl From<Sequence> for Value {
    fn from(seq: Sequence) -> Self {
        Value::Sequence(seq)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Map(map)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::sequence(items)
    }
}

#[cfg(feature = "serde")]
#[cfg_attr(docsrs, doc(cfg(feature = "serde")))]
impl Value {
    /// Render as JSON the way `JSON.stringify` would.
    ///
    /// Map keys keep insertion order. `Undefined` and callables are skipped
    /// inside maps and become `null` inside sequences. Non-finite numbers and invalid dates become `null`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CyclicStructure`] if the value contains itself.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(self
            .json_with(&mut Vec::new())?
            .unwrap_or(serde_json::Value::Null))
    }

    fn json_with(&self, seen: &mut Vec<usize>) -> Result<Option<serde_json::Value>> {
        use serde_json::Value as Json;

        if let Some(address) = self.address() {
            if seen.contains(&address) {
                return Err(Error::CyclicStructure);
            }
            seen.push(address);
        }
        let json = match self {
            Value::Undefined | Value::Callable(_) => None,
            Value::Null => Some(Json::Null),
            Value::Bool(b) => Some(Json::Bool(*b)),
            Value::Number(n) => Some(json_number(*n)),
            Value::Text(s) => Some(Json::String(s.to_string())),
            Value::Boxed(inner) => inner.json_with(seen)?,
            Value::Date(t) => Some(
                t.datetime()
                    .map_or(Json::Null, |_| Json::String(t.to_string())),
            ),
            Value::Pattern(_) => Some(Json::Object(serde_json::Map::new())),
            Value::Sequence(seq) => {
                let mut items = Vec::with_capacity(seq.len());
                for slot in seq.slots().iter() {
                    let item = match slot {
                        Some(v) => v.json_with(seen)?,
                        None => None,
                    };
                    items.push(item.unwrap_or(Json::Null));
                }
                Some(Json::Array(items))
            }
            Value::Map(map) => {
                let mut object = serde_json::Map::new();
                for (key, v) in map.entries().iter() {
                    if let Some(json) = v.json_with(seen)? {
                        object.insert(key.clone(), json);
                    }
                }
                Some(Json::Object(object))
            }
        };
        if self.address().is_some() {
            seen.pop();
        }
        Ok(json)
    }
}

#[cfg(feature = "serde")]
fn json_number(n: f64) -> serde_json::Value {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
    }
}
