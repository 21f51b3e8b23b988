use ethpm_common::{Address, ContentAddress, RegistryId, RegistryUri, Release, Uri};
use proptest::prelude::*;
use smol_str::SmolStr;

fn address() -> impl Strategy<Value = Address> {
    any::<[u8; 20]>().prop_map(Address::from_bytes)
}

fn release() -> impl Strategy<Value = Option<Release>> {
    proptest::option::of(
        ("[a-z][-a-z0-9]{0,20}", 0u32..50, 0u32..50, 0u32..50).prop_map(
            |(name, major, minor, patch)| Release {
                package_name: SmolStr::new(name),
                version: SmolStr::new(format!("{major}.{minor}.{patch}")),
            },
        ),
    )
}

fn registry_uri() -> impl Strategy<Value = RegistryUri> {
    (address(), any::<u64>(), release()).prop_map(|(address, chain_id, release)| RegistryUri {
        registry: RegistryId::new(address, chain_id),
        release,
    })
}

fn uri_string() -> impl Strategy<Value = String> {
    prop_oneof![
        proptest::collection::vec(any::<u8>(), 0..256).prop_map(|bytes| {
            format!("ipfs://{}", ContentAddress::compute(&bytes).unwrap())
        }),
        registry_uri().prop_map(|u| u.to_string()),
        (
            "[a-zA-Z0-9_-]{1,16}",
            "[a-zA-Z0-9_-]{1,16}",
            any::<[u8; 20]>()
        )
            .prop_map(|(owner, repo, hash)| format!(
                "https://api.github.com/repos/{owner}/{repo}/git/blobs/{}",
                hex::encode(hash)
            )),
    ]
}

proptest! {
    #[test]
    fn display_reparses_to_equal_uri(s in uri_string()) {
        let parsed = Uri::parse(&s).unwrap();
        let again = Uri::parse(&parsed.to_string()).unwrap();
        prop_assert_eq!(parsed, again);
    }

    #[test]
    fn same_registry_ignores_release(a in registry_uri(), r in release()) {
        let b = RegistryUri { registry: a.registry, release: r };
        prop_assert!(a.same_registry(&b));
        prop_assert!(b.same_registry(&a));
    }

    #[test]
    fn same_registry_distinguishes_chain_and_address(
        a in registry_uri(),
        other_addr in address(),
        other_chain in any::<u64>(),
    ) {
        let moved = RegistryUri {
            registry: RegistryId::new(other_addr, a.registry.chain_id),
            release: a.release.clone(),
        };
        prop_assert_eq!(a.same_registry(&moved), other_addr == a.registry.address);

        let rechained = RegistryUri {
            registry: RegistryId::new(a.registry.address, other_chain),
            release: a.release.clone(),
        };
        prop_assert_eq!(a.same_registry(&rechained), other_chain == a.registry.chain_id);
    }
}

#[test]
fn same_registry_vectors() {
    let cases = [
        (
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1",
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1",
            true,
        ),
        (
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1/dai?version=1.0.0",
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1",
            true,
        ),
        (
            "erc1319://0x6b5da3ca4286baa7fbaf64eeee1834c7d430b729:1",
            "erc1319://0x6B5DA3CA4286BAA7FBAF64EEEE1834C7D430B729:1",
            true,
        ),
        (
            "erc1319://0xA635F17288187daE5b424D343E21FF44a79ce922:1",
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1",
            false,
        ),
        (
            "erc1319://0xA635F17288187daE5b424D343E21FF44a79ce922:1/dai?version=1.0.0",
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1",
            false,
        ),
        (
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:3",
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1",
            false,
        ),
        (
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:3/dai?version=1.0.0",
            "erc1319://0x6b5DA3cA4286Baa7fBaf64EEEE1834C7d430B729:1",
            false,
        ),
    ];
    for (a, b, expected) in cases {
        let a = RegistryUri::parse(a).unwrap();
        let b = RegistryUri::parse(b).unwrap();
        assert_eq!(a.same_registry(&b), expected, "{a} vs {b}");
    }
}
