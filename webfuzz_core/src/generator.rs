use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::collections::BTreeMap;

const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Printable ASCII punctuation without `"` and `\`, so values stay inside a
/// JSON string literal.
const SPECIAL_CHARS: &[u8] = b"!#$%&'()*+,-./:;<=>?@[]^_`{|}~ ";

const MAX_RANDOM_STRING_LEN: usize = 32;
const MIN_OVERFLOW_LEN: usize = 256;
const MAX_OVERFLOW_LEN: usize = 8192;

/// A source of values for an `FG` tag.
///
/// Generators make no promise of determinism; the built-ins are deterministic
/// for a given seed.
pub trait ValueGenerator: Send {
    fn generate(&mut self) -> String;
}

/// Builds a generator instance from a seed.
pub type GeneratorFactory = Box<dyn Fn(u64) -> Box<dyn ValueGenerator> + Send + Sync>;

/// Name → factory mapping used to resolve `FG` tags.
pub struct GeneratorRegistry {
    factories: BTreeMap<String, GeneratorFactory>,
    seed: u64,
}

impl GeneratorRegistry {
    /// An empty registry. Most callers want [`GeneratorRegistry::with_builtins`].
    pub fn new(seed: u64) -> Self {
        Self {
            factories: BTreeMap::new(),
            seed,
        }
    }

    pub fn with_builtins(seed: u64) -> Self {
        let mut registry = Self::new(seed);
        registry.register("alphanumeric", |seed| {
            Box::new(CharsetGenerator::new(ALPHANUMERIC, seed))
        });
        registry.register("specialchars", |seed| {
            Box::new(CharsetGenerator::new(SPECIAL_CHARS, seed))
        });
        registry.register("numeric", |seed| Box::new(NumericGenerator::new(seed)));
        registry.register("overflow", |seed| Box::new(OverflowGenerator::new(seed)));
        registry
    }

    /// Adds or replaces a generator under `name`.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(u64) -> Box<dyn ValueGenerator> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Instantiates the generator registered under `name` for the value
    /// stream identified by `stream` (the tag literal).
    ///
    /// The instance seed mixes the registry seed with `stream`, so distinct
    /// tags on the same generator draw independent values while a rerun with
    /// the same seed reproduces them.
    pub fn instantiate(&self, name: &str, stream: &str) -> Option<Box<dyn ValueGenerator>> {
        let factory = self.factories.get(name)?;
        let digest = md5::compute(stream.as_bytes());
        let mut stream_bits = [0u8; 8];
        stream_bits.copy_from_slice(&digest.0[..8]);
        Some(factory(self.seed ^ u64::from_le_bytes(stream_bits)))
    }
}

impl std::fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("names", &self.factories.keys().collect::<Vec<_>>())
            .field("seed", &self.seed)
            .finish()
    }
}

/// Random strings drawn from a fixed character set.
pub struct CharsetGenerator {
    charset: &'static [u8],
    rng: ChaCha8Rng,
}

impl CharsetGenerator {
    pub fn new(charset: &'static [u8], seed: u64) -> Self {
        Self {
            charset,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl ValueGenerator for CharsetGenerator {
    fn generate(&mut self) -> String {
        let len = self.rng.random_range(1..=MAX_RANDOM_STRING_LEN);
        (0..len)
            .map(|_| self.charset[self.rng.random_range(0..self.charset.len())] as char)
            .collect()
    }
}

pub struct NumericGenerator {
    rng: ChaCha8Rng,
}

impl NumericGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl ValueGenerator for NumericGenerator {
    fn generate(&mut self) -> String {
        self.rng.random::<i64>().to_string()
    }
}

/// Long runs of a single character, for probing length limits.
pub struct OverflowGenerator {
    rng: ChaCha8Rng,
}

impl OverflowGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl ValueGenerator for OverflowGenerator {
    fn generate(&mut self) -> String {
        let len = self.rng.random_range(MIN_OVERFLOW_LEN..=MAX_OVERFLOW_LEN);
        "A".repeat(len)
    }
}
