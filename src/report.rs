//! Renders a security descriptor as the viewer's textual report.
//!
//! All of this is descriptive: constant name tables indexed by bit
//! position or type value, with an explicit unknown fallback, written to
//! any `io::Write` so tests can capture the output.

use std::borrow::Cow;
use std::io::Write;

use crate::acl::Acl;
use crate::error::Error;
use crate::sid::Sid;

/// `SECURITY_DESCRIPTOR_CONTROL` bits, low to high.
const CONTROL_FLAG_NAMES: [Option<&str>; 16] = [
    Some("SE_OWNER_DEFAULTED"),
    Some("SE_GROUP_DEFAULTED"),
    Some("SE_DACL_PRESENT"),
    Some("SE_DACL_DEFAULTED"),
    Some("SE_SACL_PRESENT"),
    Some("SE_SACL_DEFAULTED"),
    Some("SE_DACL_UNTRUSTED"),
    Some("SE_SERVER_SECURITY"),
    Some("SE_DACL_AUTO_INHERIT_REQ"),
    Some("SE_SACL_AUTO_INHERIT_REQ"),
    Some("SE_DACL_AUTO_INHERITED"),
    Some("SE_SACL_AUTO_INHERITED"),
    Some("SE_DACL_PROTECTED"),
    Some("SE_SACL_PROTECTED"),
    Some("SE_RM_CONTROL_VALID"),
    Some("SE_SELF_RELATIVE"),
];

/// File-object access mask bits. Generic and reserved bits above
/// SYNCHRONIZE are not enumerated.
const ACCESS_RIGHT_NAMES: [Option<&str>; 21] = [
    Some("FILE_READ_DATA / FILE_LIST_DIRECTORY"),   // 0x00000001
    Some("FILE_WRITE_DATA / FILE_ADD_FILE"),        // 0x00000002
    Some("FILE_APPEND_DATA / FILE_ADD_SUBDIRECTORY"), // 0x00000004
    Some("FILE_READ_EA"),                           // 0x00000008
    Some("FILE_WRITE_EA"),                          // 0x00000010
    Some("FILE_EXECUTE / FILE_TRAVERSE"),           // 0x00000020
    Some("FILE_DELETE_CHILD"),                      // 0x00000040
    Some("FILE_READ_ATTRIBUTES"),                   // 0x00000080
    Some("FILE_WRITE_ATTRIBUTES"),                  // 0x00000100
    None,                                           // 0x00000200
    None,                                           // 0x00000400
    None,                                           // 0x00000800
    None,                                           // 0x00001000
    None,                                           // 0x00002000
    None,                                           // 0x00004000
    None,                                           // 0x00008000
    Some("DELETE"),                                 // 0x00010000
    Some("READ_CONTROL"),                           // 0x00020000
    Some("WRITE_DAC"),                              // 0x00040000
    Some("WRITE_OWNER"),                            // 0x00080000
    Some("SYNCHRONIZE"),                            // 0x00100000
];

/// ACE type values 0x00 through 0x15.
const ACE_TYPE_NAMES: [&str; 22] = [
    "ACCESS_ALLOWED_ACE",
    "ACCESS_DENIED_ACE",
    "SYSTEM_AUDIT_ACE",
    "SYSTEM_ALARM_ACE",
    "COMPOUND_ACCESS_ALLOWED_ACE",
    "ACCESS_ALLOWED_OBJECT_ACE",
    "ACCESS_DENIED_OBJECT_ACE",
    "SYSTEM_AUDIT_OBJECT_ACE",
    "SYSTEM_ALARM_OBJECT_ACE",
    "ACCESS_ALLOWED_CALLBACK_ACE",
    "ACCESS_DENIED_CALLBACK_ACE",
    "ACCESS_ALLOWED_CALLBACK_OBJECT_ACE",
    "ACCESS_DENIED_CALLBACK_OBJECT_ACE",
    "SYSTEM_AUDIT_CALLBACK_ACE",
    "SYSTEM_ALARM_CALLBACK_ACE",
    "SYSTEM_AUDIT_CALLBACK_OBJECT_ACE",
    "SYSTEM_ALARM_CALLBACK_OBJECT_ACE",
    "SYSTEM_MANDATORY_LABEL_ACE",
    "SYSTEM_RESOURCE_ATTRIBUTE_ACE",
    "SYSTEM_SCOPED_POLICY_ID_ACE",
    "SYSTEM_PROCESS_TRUST_LABEL_ACE",
    "SYSTEM_ACCESS_FILTER_ACE",
];

const ACE_FLAG_NAMES: [Option<&str>; 5] = [
    Some("OBJECT_INHERIT_ACE"),
    Some("CONTAINER_INHERIT_ACE"),
    Some("NO_PROPAGATE_INHERIT_ACE"),
    Some("INHERIT_ONLY_ACE"),
    Some("INHERITED_ACE"),
];

fn hex(value: u32, width: usize) -> String {
    format!(" (0x{value:0width$x})")
}

fn write_bit_names<W: Write>(
    out: &mut W,
    indent: &str,
    value: u32,
    names: &[Option<&str>],
    width: usize,
) -> std::io::Result<()> {
    for (index, name) in names.iter().enumerate() {
        let bit = 1u32 << index;
        if value & bit == 0 {
            continue;
        }
        writeln!(out, "{indent}{}{}", name.unwrap_or("Unknown"), hex(bit, width))?;
    }
    Ok(())
}

/// Name for a raw ACE type value.
pub fn ace_type_name(ace_type: u8) -> Cow<'static, str> {
    match ACE_TYPE_NAMES.get(ace_type as usize) {
        Some(name) => Cow::Borrowed(*name),
        None => Cow::Owned(format!("Unknown Type ({ace_type})")),
    }
}

/// The `Control Flags:` block, one line per set bit.
pub fn write_control_flags<W: Write>(out: &mut W, control: u16) -> std::io::Result<()> {
    writeln!(out, "Control Flags:")?;
    write_bit_names(out, "\t", u32::from(control), &CONTROL_FLAG_NAMES, 4)
}

fn write_ace_flags<W: Write>(out: &mut W, flags: u8) -> std::io::Result<()> {
    writeln!(out, "\tFlags:")?;
    write_bit_names(out, "\t\t", u32::from(flags), &ACE_FLAG_NAMES, 2)
}

fn write_access_rights<W: Write>(out: &mut W, mask: u32) -> std::io::Result<()> {
    writeln!(out, "\tRights:")?;
    write_bit_names(out, "\t\t", mask, &ACCESS_RIGHT_NAMES, 8)
}

/// The `Dacl:` block: one sub-block per entry with its index, type name,
/// flags, resolved principal, and decoded rights. Entries that are not
/// plain allow/deny are reported as unsupported and skipped.
pub fn write_dacl<W, F>(out: &mut W, acl: &Acl, mut resolve: F) -> anyhow::Result<()>
where
    W: Write,
    F: FnMut(&Sid) -> Result<String, Error>,
{
    writeln!(out, "Dacl:")?;

    for (index, ace) in acl.aces().enumerate() {
        writeln!(out, "\t#{index}: {}", ace_type_name(ace.kind().raw()))?;

        let (Some(mask), Some(sid)) = (ace.mask(), ace.sid()) else {
            writeln!(out, "\tUnsupported")?;
            continue;
        };

        write_ace_flags(out, ace.flags())?;
        writeln!(out, "\tUser: {}", resolve(&sid)?)?;
        write_access_rights(out, mask)?;
        writeln!(out)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ace::{Ace, CONTAINER_INHERIT_ACE, FILE_ALL_ACCESS, OBJECT_INHERIT_ACE};
    use crate::acl::{Acl, ACL_HEADER_LEN};
    use crate::sid::Sid;

    fn render_dacl(acl: &Acl) -> String {
        let mut out = Vec::new();
        write_dacl(&mut out, acl, |sid| Ok(format!("TEST\\{sid}"))).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn control_flags_render_known_and_set_bits_only() {
        let mut out = Vec::new();
        // SE_DACL_PRESENT | SE_SELF_RELATIVE
        write_control_flags(&mut out, 0x8004).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Control Flags:\n\tSE_DACL_PRESENT (0x0004)\n\tSE_SELF_RELATIVE (0x8000)\n"
        );
    }

    #[test]
    fn ace_type_names_cover_the_table_and_fall_back() {
        assert_eq!(ace_type_name(0), "ACCESS_ALLOWED_ACE");
        assert_eq!(ace_type_name(17), "SYSTEM_MANDATORY_LABEL_ACE");
        assert_eq!(ace_type_name(21), "SYSTEM_ACCESS_FILTER_ACE");
        assert_eq!(ace_type_name(22), "Unknown Type (22)");
    }

    #[test]
    fn unnamed_rights_bits_render_as_unknown() {
        let mut out = Vec::new();
        write_access_rights(&mut out, 0x0000_0201).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\tRights:\n\t\tFILE_READ_DATA / FILE_LIST_DIRECTORY (0x00000001)\n\t\tUnknown (0x00000200)\n"
        );
    }

    #[test]
    fn dacl_report_lists_entries_in_order() {
        let sid = Sid::from_parts(5, &[32, 544]).unwrap();
        let allow = Ace::access_allowed(
            CONTAINER_INHERIT_ACE | OBJECT_INHERIT_ACE,
            FILE_ALL_ACCESS,
            &sid,
        );
        let mut acl = Acl::with_capacity(ACL_HEADER_LEN + allow.len()).unwrap();
        acl.append(&allow).unwrap();

        let report = render_dacl(&acl);
        assert!(report.starts_with("Dacl:\n\t#0: ACCESS_ALLOWED_ACE\n"));
        assert!(report.contains("\tFlags:\n\t\tOBJECT_INHERIT_ACE (0x01)\n\t\tCONTAINER_INHERIT_ACE (0x02)\n"));
        assert!(report.contains("\tUser: TEST\\S-1-5-32-544\n"));
        assert!(report.contains("\t\tSYNCHRONIZE (0x00100000)\n"));
        assert!(report.ends_with("\n\n"));
    }

    #[test]
    fn non_allow_deny_entries_are_reported_unsupported() {
        // a SYSTEM_AUDIT_ACE-shaped opaque blob
        let raw = [0x02u8, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00];
        let audit = Ace::decode(&raw).unwrap();
        let mut acl = Acl::with_capacity(ACL_HEADER_LEN + audit.len()).unwrap();
        acl.append(&audit).unwrap();

        assert_eq!(render_dacl(&acl), "Dacl:\n\t#0: SYSTEM_AUDIT_ACE\n\tUnsupported\n");
    }

    #[test]
    fn empty_dacl_prints_only_the_heading() {
        assert_eq!(render_dacl(&Acl::empty()), "Dacl:\n");
    }
}
