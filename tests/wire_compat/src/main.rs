fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use prost::Message;
    use rv_upload_protocol::{
        FILE_UPLOAD_PATH, Project, SERVICE_NAME, Status, UploadRequest, UploadResponse,
        checksum_hex,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a hex fixture. Lines starting with `#` describe the message and
    /// are skipped.
    fn load_fixture(name: &str) -> Vec<u8> {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        let digits: String = data
            .lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .flat_map(|line| line.chars().filter(|c| !c.is_whitespace()))
            .collect();
        hex::decode(&digits)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Decodes a fixture, checks it against `expected`, and checks that
    /// encoding `expected` reproduces the fixture byte for byte.
    fn wire_test<T>(name: &str, expected: &T)
    where
        T: Message + Default + PartialEq + std::fmt::Debug,
    {
        let fixture = load_fixture(name);
        let decoded =
            T::decode(fixture.as_slice()).unwrap_or_else(|e| panic!("failed to decode {name}: {e}"));
        assert_eq!(&decoded, expected, "decode mismatch for {name}");
        assert_eq!(
            expected.encode_to_vec(),
            fixture,
            "encode mismatch for {name}:\n  fixture: {}\n  rust:    {}",
            hex::encode(&fixture),
            hex::encode(expected.encode_to_vec())
        );
    }

    // --- Request ---

    #[test]
    fn fixture_request_routeviews() {
        let expected =
            UploadRequest::for_content("a.txt", b"hello".to_vec(), true, Project::Routeviews);
        assert_eq!(expected.checksum, "5d41402abc4b2a76b9719d911017c592");
        wire_test("upload_request_routeviews.hex", &expected);
    }

    #[test]
    fn fixture_request_defaults_are_omitted() {
        let expected = UploadRequest::for_content("rib.bz2", Vec::new(), false, Project::Unknown);
        assert_eq!(expected.checksum, "d41d8cd98f00b204e9800998ecf8427e");
        wire_test("upload_request_defaults.hex", &expected);
    }

    #[test]
    fn fixture_request_rib() {
        let expected = UploadRequest::for_content(
            "route-views2/rib.bz2",
            b"rib".to_vec(),
            false,
            Project::RouteviewsRib,
        );
        wire_test("upload_request_rib.hex", &expected);
    }

    #[test]
    fn decoded_fixture_checksums_match() {
        for name in [
            "upload_request_routeviews.hex",
            "upload_request_defaults.hex",
            "upload_request_rib.hex",
        ] {
            let req = UploadRequest::decode(load_fixture(name).as_slice()).unwrap();
            assert!(req.checksum_matches(), "{name}");
            assert_eq!(req.checksum, checksum_hex(&req.content), "{name}");
        }
    }

    // --- Response ---

    #[test]
    fn fixture_response_success() {
        wire_test("upload_response_success.hex", &UploadResponse::success());
    }

    #[test]
    fn fixture_response_fail() {
        let expected = UploadResponse::failure("checksum failure");
        wire_test("upload_response_fail.hex", &expected);
        assert_eq!(expected.status(), Status::Fail);
    }

    // --- Forward compatibility ---

    #[test]
    fn unknown_fields_are_skipped() {
        let mut bytes = load_fixture("upload_response_fail.hex");
        // Field 15, varint 1: a field this schema does not define.
        bytes.extend_from_slice(&[0x78, 0x01]);
        let resp = UploadResponse::decode(bytes.as_slice()).unwrap();
        assert_eq!(resp, UploadResponse::failure("checksum failure"));
    }

    #[test]
    fn unknown_enum_values_read_as_unknown() {
        let mut req = UploadRequest::decode(load_fixture("upload_request_rib.hex").as_slice())
            .unwrap();
        req.project = 42;
        let decoded = UploadRequest::decode(req.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.project, 42);
        assert_eq!(decoded.project(), Project::Unknown);

        let resp = UploadResponse::decode(&[0x08, 0x09][..]).unwrap();
        assert_eq!(resp.status(), Status::Unknown);
        assert!(!resp.is_success());
    }

    // --- Service naming ---

    #[test]
    fn rpc_path_matches_deployed_service() {
        assert_eq!(SERVICE_NAME, "rv.proto.RV");
        assert_eq!(FILE_UPLOAD_PATH, "/rv.proto.RV/FileUpload");
    }

    #[test]
    fn enum_names_match_schema() {
        let projects = [
            (Project::Unknown, 0, "UNKNOWN"),
            (Project::Routeviews, 1, "ROUTEVIEWS"),
            (Project::RipeRis, 2, "RIPE_RIS"),
            (Project::RpkiRarc, 3, "RPKI_RARC"),
            (Project::RouteviewsRib, 4, "ROUTEVIEWS_RIB"),
        ];
        for (project, value, name) in projects {
            assert_eq!(project as i32, value);
            assert_eq!(project.as_str_name(), name);
        }

        let statuses = [
            (Status::Unknown, 0, "UNKNOWN"),
            (Status::Success, 1, "SUCCESS"),
            (Status::Fail, 2, "FAIL"),
        ];
        for (status, value, name) in statuses {
            assert_eq!(status as i32, value);
            assert_eq!(status.as_str_name(), name);
        }
    }
}
