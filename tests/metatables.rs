mod common;

#[cfg(test)]
mod metatable_tests {
    use super::common::{error_message, run};

    #[test]
    fn test_metatables_01_index_chain() {
        let out = run(
            "local base = {greet = 'hi'}\n\
             local t1 = setmetatable({}, {__index = base})\n\
             local t2 = setmetatable({}, {__index = t1})\n\
             print(t2.greet, t2.missing, rawget(t2, 'greet'))",
        );
        assert_eq!(out, "hi\tnil\tnil\n");
    }

    #[test]
    fn test_metatables_02_index_and_newindex_functions() {
        let out = run(
            "local log = {}\n\
             local proxy = setmetatable({}, {\n\
               __index = function(t, k) return k .. '!' end,\n\
               __newindex = function(t, k, v) rawset(t, k, v * 2) end,\n\
             })\n\
             proxy.x = 21\n\
             print(proxy.x, proxy.y)",
        );
        assert_eq!(out, "42\ty!\n");
    }

    #[test]
    fn test_metatables_03_newindex_skipped_for_existing_keys() {
        let out = run(
            "local store = {}\n\
             local t = setmetatable({present = 1}, {__newindex = store})\n\
             t.present = 2\n\
             t.absent = 3\n\
             print(t.present, rawget(t, 'absent'), store.absent)",
        );
        assert_eq!(out, "2\tnil\t3\n");
    }

    #[test]
    fn test_metatables_04_protected_metatable() {
        let out = run(
            "local mt = {__metatable = 'locked'}\n\
             local t = setmetatable({}, mt)\n\
             print(getmetatable(t))\n\
             local ok, err = pcall(setmetatable, t, {})\n\
             print(ok, err)\n\
             print(getmetatable(t))",
        );
        assert_eq!(
            out,
            "locked\nfalse\tcannot change a protected metatable\nlocked\n"
        );
    }

    #[test]
    fn test_metatables_05_arithmetic_metamethods() {
        let out = run(
            "local V = {}\n\
             V.__index = V\n\
             local function vec(x, y) return setmetatable({x = x, y = y}, V) end\n\
             V.__add = function(a, b) return vec(a.x + b.x, a.y + b.y) end\n\
             V.__unm = function(a) return vec(-a.x, -a.y) end\n\
             V.__mul = function(a, b)\n\
               if type(a) == 'number' then return vec(a * b.x, a * b.y) end\n\
               return vec(a.x * b, a.y * b)\n\
             end\n\
             local v = vec(1, 2) + vec(3, 4)\n\
             local w = -(2 * v)\n\
             print(v.x, v.y, w.x, w.y)",
        );
        assert_eq!(out, "4\t6\t-8\t-12\n");
    }

    #[test]
    fn test_metatables_06_comparison_and_equality() {
        let out = run(
            "local mt = {}\n\
             mt.__eq = function(a, b) return a.v == b.v end\n\
             mt.__lt = function(a, b) return a.v < b.v end\n\
             mt.__le = function(a, b) return a.v <= b.v end\n\
             local a = setmetatable({v = 1}, mt)\n\
             local b = setmetatable({v = 1}, mt)\n\
             local c = setmetatable({v = 2}, mt)\n\
             print(a == b, a ~= c, a < c, c <= a, c > a, rawequal(a, b))",
        );
        assert_eq!(out, "true\ttrue\ttrue\tfalse\ttrue\tfalse\n");
    }

    #[test]
    fn test_metatables_07_call_concat_len_tostring() {
        let out = run(
            "local mt = {\n\
               __call = function(self, a, b) return a + b end,\n\
               __concat = function(a, b) return 'joined' end,\n\
               __len = function() return 99 end,\n\
               __tostring = function() return 'custom' end,\n\
             }\n\
             local obj = setmetatable({}, mt)\n\
             print(obj(2, 3), obj .. 'x', 'x' .. obj, #obj, tostring(obj))\n\
             print(obj)",
        );
        assert_eq!(out, "5\tjoined\tjoined\t99\tcustom\ncustom\n");
    }

    #[test]
    fn test_metatables_08_name_field_in_display() {
        let out = run("print(tostring(setmetatable({}, {__name = 'Point'})))");
        assert!(out.starts_with("Point: 0x"), "got {}", out);
    }

    #[test]
    fn test_metatables_09_pairs_metamethod() {
        let out = run(
            "local t = setmetatable({}, {__pairs = function(t)\n\
               local i = 0\n\
               return function() i = i + 1; if i <= 2 then return i, i * 10 end end, t, nil\n\
             end})\n\
             for k, v in pairs(t) do print(k, v) end",
        );
        assert_eq!(out, "1\t10\n2\t20\n");
    }

    #[test]
    fn test_metatables_10_index_loop_is_detected() {
        let message = error_message(
            "local t = {}\n\
             setmetatable(t, {__index = t})\n\
             local v = t.missing",
        );
        assert_eq!(message, "input:3: '__index' chain too long; possibly a loop");
    }

    #[test]
    fn test_metatables_11_tostring_must_return_a_string() {
        let message = error_message(
            "local t = setmetatable({}, {__tostring = function() return {} end})\n\
             print(t)",
        );
        assert_eq!(message, "input:2: '__tostring' must return a string");
    }
}
