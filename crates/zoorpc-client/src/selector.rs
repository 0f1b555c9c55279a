use rand::Rng;

/// Uniform random choice among the current providers.
///
/// Stateless: every call draws independently, so concurrent calls need no
/// coordination.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSelector;

impl RandomSelector {
    pub fn new() -> Self {
        Self
    }

    /// Pick a provider, or `None` when the list is empty
    pub fn select<'a>(&self, hosts: &'a [String]) -> Option<&'a str> {
        match hosts.len() {
            0 => None,
            1 => Some(hosts[0].as_str()),
            n => Some(hosts[rand::rng().random_range(0..n)].as_str()),
        }
    }
}
