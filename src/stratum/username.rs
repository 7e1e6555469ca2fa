use super::*;

/// A miner login of the form `address.worker`. Anything outside
/// `[a-zA-Z0-9.]` is stripped before splitting; a missing worker part
/// defaults to `noname`.
#[derive(Debug, Clone, PartialEq, Eq, DeserializeFromStr, SerializeDisplay)]
pub struct Username {
    address: String,
    worker: String,
}

impl Username {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }
}

impl FromStr for Username {
    type Err = InternalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sanitized = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '.')
            .collect::<String>();

        let (address, worker) = match sanitized.split_once('.') {
            Some((address, worker)) if !worker.is_empty() => {
                (address.to_string(), worker.replace('.', ""))
            }
            Some((address, _)) => (address.to_string(), "noname".to_string()),
            None => (sanitized, "noname".to_string()),
        };

        Ok(Username { address, worker })
    }
}

impl Display for Username {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.address, self.worker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn case(raw: &str, address: &str, worker: &str) {
        let username = raw.parse::<Username>().unwrap();
        assert_eq!(username.address(), address, "address of {raw:?}");
        assert_eq!(username.worker(), worker, "worker of {raw:?}");
    }

    #[test]
    fn splits_address_and_worker() {
        case("RAddress.rig1", "RAddress", "rig1");
    }

    #[test]
    fn missing_worker_defaults_to_noname() {
        case("RAddress", "RAddress", "noname");
        case("RAddress.", "RAddress", "noname");
    }

    #[test]
    fn strips_forbidden_characters() {
        case("RAdd ress!.rig_1", "RAddress", "rig1");
        case("R@Address.rig/1", "RAddress", "rig1");
    }

    #[test]
    fn extra_dots_collapse_into_worker() {
        case("RAddress.rig.one", "RAddress", "rigone");
    }

    #[test]
    fn display_rejoins_parts() {
        assert_eq!(
            "RAddress.rig1".parse::<Username>().unwrap().to_string(),
            "RAddress.rig1"
        );
    }
}
