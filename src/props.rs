//! Property dictionary: a tagged TLV stream decoded out of a MetaBlob.

/// A single decoded property value.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    Int(i32),
    UInt64(u64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
}

/// A decoded property dictionary: an ordered, keyed set of typed values.
#[derive(Clone, Debug, Default)]
pub struct PropsDictionary {
    pub properties: Vec<(String, PropValue)>,
}

const TYPE_INT: i32 = 1;
const TYPE_UINT64: i32 = 2;
const TYPE_MBS: i32 = 3;
const TYPE_WCS: i32 = 4;
const TYPE_BIN: i32 = 5;
const TYPE_BOOL: i32 = 6;

impl PropsDictionary {
    /// Decodes as many well-formed records as possible from `data`,
    /// stopping at the end marker or the first malformed record.
    pub fn parse(data: &[u8]) -> Self {
        let mut properties = Vec::new();
        let mut offset = 0usize;

        loop {
            if offset + 4 > data.len() {
                break;
            }
            let prop_type = i32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());
            offset += 4;

            if prop_type == -1 {
                break;
            }
            if !(1..=6).contains(&prop_type) {
                break;
            }

            if offset + 4 > data.len() {
                break;
            }
            let key_len = u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
            offset += 4;

            if key_len > 0x100 || offset + key_len > data.len() {
                break;
            }
            let key = String::from_utf8_lossy(&data[offset..offset + key_len])
                .trim_end_matches('\0')
                .to_string();
            offset += key_len;

            if key.is_empty() || !key.chars().all(|c| (0x20..=0x7E).contains(&(c as u32))) {
                break;
            }

            let value = match prop_type {
                TYPE_INT => {
                    if offset + 4 > data.len() {
                        break;
                    }
                    let v = i32::from_le_bytes(data[offset..offset + 4].try_into().unwrap());
                    offset += 4;
                    PropValue::Int(v)
                }
                TYPE_UINT64 => {
                    if offset + 8 > data.len() {
                        break;
                    }
                    let v = u64::from_le_bytes(data[offset..offset + 8].try_into().unwrap());
                    offset += 8;
                    PropValue::UInt64(v)
                }
                TYPE_BOOL => {
                    if offset + 4 > data.len() {
                        break;
                    }
                    let v = i32::from_le_bytes(data[offset..offset + 4].try_into().unwrap()) != 0;
                    offset += 4;
                    PropValue::Bool(v)
                }
                TYPE_MBS | TYPE_WCS | TYPE_BIN => {
                    if offset + 4 > data.len() {
                        break;
                    }
                    let value_len =
                        u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
                    offset += 4;
                    if value_len > 0x10_0000 || offset + value_len > data.len() {
                        break;
                    }
                    let raw = &data[offset..offset + value_len];
                    offset += value_len;
                    match prop_type {
                        TYPE_MBS => match std::str::from_utf8(raw) {
                            Ok(s) => PropValue::Str(s.to_string()),
                            Err(_) => PropValue::Bytes(raw.to_vec()),
                        },
                        TYPE_WCS => {
                            let units: Vec<u16> = raw
                                .chunks_exact(2)
                                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                                .collect();
                            match String::from_utf16(&units) {
                                Ok(s) => PropValue::Str(s),
                                Err(_) => PropValue::Bytes(raw.to_vec()),
                            }
                        }
                        _ => PropValue::Bytes(raw.to_vec()),
                    }
                }
                _ => unreachable!("prop_type filtered to 1..=6 above"),
            };

            properties.push((key, value));
        }

        Self { properties }
    }

    /// A dictionary with at least one property is "present"; an empty one
    /// is treated as absent by callers that only check for presence.
    pub fn is_present(&self) -> bool {
        !self.properties.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.properties.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_tlv(buf: &mut Vec<u8>, prop_type: i32, key: &str, mut payload: Vec<u8>) {
        buf.extend_from_slice(&prop_type.to_le_bytes());
        buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
        buf.extend_from_slice(key.as_bytes());
        buf.append(&mut payload);
    }

    #[test]
    fn scenario_g_props_dictionary() {
        let mut buf = Vec::new();
        push_tlv(&mut buf, TYPE_INT, "n", 7i32.to_le_bytes().to_vec());
        push_tlv(&mut buf, TYPE_MBS, "name", {
            let mut p = 1u32.to_le_bytes().to_vec();
            p.extend_from_slice(b"x");
            p
        });
        push_tlv(&mut buf, TYPE_BOOL, "ok", 1i32.to_le_bytes().to_vec());
        buf.extend_from_slice(&(-1i32).to_le_bytes());

        let dict = PropsDictionary::parse(&buf);
        assert_eq!(dict.get("n"), Some(&PropValue::Int(7)));
        assert_eq!(dict.get("name"), Some(&PropValue::Str("x".to_string())));
        assert_eq!(dict.get("ok"), Some(&PropValue::Bool(true)));
    }

    #[test]
    fn wcs_decodes_utf16le() {
        let mut buf = Vec::new();
        let utf16: Vec<u8> = "hello"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        push_tlv(&mut buf, TYPE_WCS, "label", {
            let mut p = (utf16.len() as u32).to_le_bytes().to_vec();
            p.extend_from_slice(&utf16);
            p
        });
        buf.extend_from_slice(&(-1i32).to_le_bytes());

        let dict = PropsDictionary::parse(&buf);
        assert_eq!(dict.get("label"), Some(&PropValue::Str("hello".to_string())));
    }

    #[test]
    fn empty_dictionary_is_not_present() {
        let dict = PropsDictionary::parse(&[]);
        assert!(!dict.is_present());
    }

    #[test]
    fn stops_on_malformed_key() {
        let mut buf = Vec::new();
        push_tlv(&mut buf, TYPE_INT, "a", 1i32.to_le_bytes().to_vec());
        // A second record with a key length claiming more bytes than
        // remain should truncate the dictionary rather than panic.
        buf.extend_from_slice(&TYPE_INT.to_le_bytes());
        buf.extend_from_slice(&1000u32.to_le_bytes());

        let dict = PropsDictionary::parse(&buf);
        assert_eq!(dict.properties.len(), 1);
    }
}
