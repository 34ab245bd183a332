use super::word::UserDictWordType;

pub(crate) const MIN_PRIORITY: u32 = 0;
pub(crate) const MAX_PRIORITY: u32 = 10;

/// MeCab columns and connection costs for one word type.
#[derive(Debug)]
pub(crate) struct PartOfSpeechDetail {
    pub(crate) part_of_speech: &'static str,
    pub(crate) part_of_speech_detail_1: &'static str,
    pub(crate) part_of_speech_detail_2: &'static str,
    pub(crate) part_of_speech_detail_3: &'static str,
    pub(crate) context_id: i32,
    /// Word cost indexed by `MAX_PRIORITY - priority`.
    pub(crate) cost_candidates: [i32; 11],
}

pub(crate) const PART_OF_SPEECH_DETAIL: [(UserDictWordType, PartOfSpeechDetail); 5] = [
    (
        UserDictWordType::ProperNoun,
        PartOfSpeechDetail {
            part_of_speech: "名詞",
            part_of_speech_detail_1: "固有名詞",
            part_of_speech_detail_2: "一般",
            part_of_speech_detail_3: "*",
            context_id: 1348,
            cost_candidates: [
                -988, 3488, 4768, 6048, 7328, 8609, 8734, 8859, 8984, 9110, 14176,
            ],
        },
    ),
    (
        UserDictWordType::CommonNoun,
        PartOfSpeechDetail {
            part_of_speech: "名詞",
            part_of_speech_detail_1: "一般",
            part_of_speech_detail_2: "*",
            part_of_speech_detail_3: "*",
            context_id: 1345,
            cost_candidates: [
                -4445, 49, 1473, 2897, 4321, 5746, 6554, 7362, 8170, 8979, 15001,
            ],
        },
    ),
    (
        UserDictWordType::Verb,
        PartOfSpeechDetail {
            part_of_speech: "動詞",
            part_of_speech_detail_1: "自立",
            part_of_speech_detail_2: "*",
            part_of_speech_detail_3: "*",
            context_id: 642,
            cost_candidates: [
                3100, 6160, 6360, 6561, 6761, 6962, 7414, 7866, 8318, 8771, 13433,
            ],
        },
    ),
    (
        UserDictWordType::Adjective,
        PartOfSpeechDetail {
            part_of_speech: "形容詞",
            part_of_speech_detail_1: "自立",
            part_of_speech_detail_2: "*",
            part_of_speech_detail_3: "*",
            context_id: 20,
            cost_candidates: [
                1527, 3266, 3561, 3857, 4153, 4449, 5149, 5849, 6549, 7250, 10001,
            ],
        },
    ),
    (
        UserDictWordType::Suffix,
        PartOfSpeechDetail {
            part_of_speech: "名詞",
            part_of_speech_detail_1: "接尾",
            part_of_speech_detail_2: "一般",
            part_of_speech_detail_3: "*",
            context_id: 1358,
            cost_candidates: [
                4399, 5373, 6041, 6710, 7378, 8047, 9440, 10834, 12228, 13622, 15847,
            ],
        },
    ),
];

pub(crate) fn detail(word_type: UserDictWordType) -> &'static PartOfSpeechDetail {
    let index = match word_type {
        UserDictWordType::ProperNoun => 0,
        UserDictWordType::CommonNoun => 1,
        UserDictWordType::Verb => 2,
        UserDictWordType::Adjective => 3,
        UserDictWordType::Suffix => 4,
    };
    &PART_OF_SPEECH_DETAIL[index].1
}

impl PartOfSpeechDetail {
    /// Priority must already be within `MIN_PRIORITY..=MAX_PRIORITY`.
    pub(crate) fn cost(&self, priority: u32) -> i32 {
        self.cost_candidates[(MAX_PRIORITY - priority) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_word_type() {
        for (word_type, expected) in &PART_OF_SPEECH_DETAIL {
            assert_eq!(detail(*word_type).context_id, expected.context_id);
        }
    }

    #[test]
    fn higher_priority_means_lower_cost() {
        let proper_noun = detail(UserDictWordType::ProperNoun);
        assert_eq!(proper_noun.cost(5), 8609);
        assert_eq!(proper_noun.cost(MAX_PRIORITY), -988);
        assert_eq!(proper_noun.cost(MIN_PRIORITY), 14176);
    }
}
